//! Feed source detection from file names

/// Label used when a filename matches no known distributor
pub const DEFAULT_SOURCE: &str = "onix";

/// Filename fragments mapped to the distributor that ships them
const SOURCE_PATTERNS: &[(&str, &str)] = &[
    ("ingram", "ingram"),
    ("lightning", "ingram"),
    ("bowker", "bowker"),
    ("nielsen", "nielsen"),
    ("bookwire", "bookwire"),
    ("coresource", "coresource"),
    ("firebrand", "firebrand"),
    ("eloquence", "firebrand"),
];

/// Guess the distributor label for a feed file name.
pub fn detect_source(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    SOURCE_PATTERNS
        .iter()
        .find(|(fragment, _)| lower.contains(fragment))
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_SOURCE)
}
