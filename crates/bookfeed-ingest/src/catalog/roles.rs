//! ONIX contributor role codes (code list 17) to catalog role labels

/// Label stored when a feed gives no role code at all
pub const DEFAULT_ROLE: &str = "contributor";

/// Map an ONIX role code to the label stored on `book_contributors.role`.
///
/// Known codes get a readable label; anything else is stored lower-cased.
pub fn role_label(code: &str) -> String {
    match code.trim() {
        "A01" => "author".to_string(),
        "A12" => "illustrator".to_string(),
        "B01" => "editor".to_string(),
        "A06" => "translator".to_string(),
        "" => DEFAULT_ROLE.to_string(),
        other => other.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_roles() {
        assert_eq!(role_label("A01"), "author");
        assert_eq!(role_label("A12"), "illustrator");
        assert_eq!(role_label("B01"), "editor");
        assert_eq!(role_label("A06"), "translator");
    }

    #[test]
    fn test_unknown_roles_lower_cased() {
        assert_eq!(role_label("Z99"), "z99");
        assert_eq!(role_label("b06"), "b06");
        assert_eq!(role_label(""), DEFAULT_ROLE);
    }
}
