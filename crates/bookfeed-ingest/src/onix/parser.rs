// ONIX Feed Parser
//
// Single-pass, event-driven reader for ONIX for Books messages. Handles
// release 3.0/3.1 and 2.1, in reference-tag form (<Product>, <RecordReference>)
// or short-tag form (<product>, <a001>). Short tags are mapped to reference
// names up front so extraction only deals with one vocabulary.
//
// Only the fields the catalog stores are extracted; everything else is
// skipped without validation.

use crate::onix::models::{CandidateBook, CandidateContributor};
use chrono::NaiveDate;
use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Error Types
// ============================================================================

/// Document-level failure: the whole feed is rejected
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Not an ONIX message: root element is <{0}>")]
    NotOnix(String),

    #[error("Feed contains no XML elements")]
    Empty,

    #[error("Feed ends before <{open}> is closed")]
    Truncated { open: String },
}

pub type Result<T> = std::result::Result<T, FeedError>;

// ============================================================================
// Tag Vocabulary
// ============================================================================

const MESSAGE_TAG: &str = "ONIXMessage";
const PRODUCT_TAG: &str = "Product";
const TEXT_TAG: &str = "Text";

/// Subtrees whose content describes something other than the product itself
const IGNORED_CONTEXTS: &[&str] = &["Collection", "Series", "RelatedMaterial", "RelatedProduct"];

/// Inline XHTML elements that separate words when flattened
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "dd", "dt", "tr", "blockquote", "h1", "h2", "h3", "h4",
    "h5", "h6",
];

/// Reference name for an ONIX short tag
fn reference_tag(short: &str) -> Option<&'static str> {
    let reference = match short {
        "ONIXmessage" => "ONIXMessage",
        "header" => "Header",
        "product" => "Product",
        "a001" => "RecordReference",
        "a002" => "NotificationType",
        "productidentifier" => "ProductIdentifier",
        "b221" => "ProductIDType",
        "b244" => "IDValue",
        "b004" => "ISBN",
        "b005" => "EAN13",
        "descriptivedetail" => "DescriptiveDetail",
        "title" => "Title",
        "titledetail" => "TitleDetail",
        "titleelement" => "TitleElement",
        "b202" => "TitleType",
        "b203" => "TitleText",
        "b030" => "TitlePrefix",
        "b031" => "TitleWithoutPrefix",
        "b028" => "DistinctiveTitle",
        "b029" => "Subtitle",
        "contributor" => "Contributor",
        "b034" => "SequenceNumber",
        "b035" => "ContributorRole",
        "b036" => "PersonName",
        "b037" => "PersonNameInverted",
        "b039" => "NamesBeforeKey",
        "b040" => "KeyNames",
        "b047" => "CorporateName",
        "b044" => "BiographicalNote",
        "collection" => "Collection",
        "series" => "Series",
        "relatedmaterial" => "RelatedMaterial",
        "relatedproduct" => "RelatedProduct",
        "subject" => "Subject",
        "mainsubject" => "MainSubject",
        "x425" => "MainSubject",
        "b067" => "SubjectSchemeIdentifier",
        "b191" => "MainSubjectSchemeIdentifier",
        "b069" => "SubjectCode",
        "b070" => "SubjectHeadingText",
        "b064" => "BASICMainSubject",
        "collateraldetail" => "CollateralDetail",
        "textcontent" => "TextContent",
        "x426" => "TextType",
        "othertext" => "OtherText",
        "d102" => "TextTypeCode",
        "d104" => "Text",
        "supportingresource" => "SupportingResource",
        "x436" => "ResourceContentType",
        "resourceversion" => "ResourceVersion",
        "x435" => "ResourceLink",
        "mediafile" => "MediaFile",
        "f114" => "MediaFileTypeCode",
        "f117" => "MediaFileLink",
        "publishingdetail" => "PublishingDetail",
        "publisher" => "Publisher",
        "b081" => "PublisherName",
        "imprint" => "Imprint",
        "b079" => "ImprintName",
        "publishingdate" => "PublishingDate",
        "x448" => "PublishingDateRole",
        "b306" => "Date",
        "b003" => "PublicationDate",
        "productsupply" => "ProductSupply",
        "supplydetail" => "SupplyDetail",
        "price" => "Price",
        "j151" => "PriceAmount",
        _ => return None,
    };
    Some(reference)
}

fn canonical_tag(local_name: &[u8]) -> String {
    let name = String::from_utf8_lossy(local_name);
    match reference_tag(&name) {
        Some(reference) => reference.to_string(),
        None => name.into_owned(),
    }
}

/// XML's predefined entities, then the HTML5 named entities that DTD-declared
/// ONIX 2.1 feeds and hand-edited 3.0 feeds use (`&eacute;`, `&nbsp;`, ...)
fn resolve_entity(entity: &str) -> Option<&'static str> {
    resolve_predefined_entity(entity).or_else(|| resolve_html5_entity(entity))
}

// ============================================================================
// Parser
// ============================================================================

/// Parser for ONIX feed files
#[derive(Debug, Default, Clone, Copy)]
pub struct OnixParser;

impl OnixParser {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse one feed file
    pub async fn parse(&self, path: &Path) -> Result<Vec<CandidateBook>> {
        let bytes = tokio::fs::read(path).await?;
        self.parse_reader(bytes.as_slice())
    }

    pub fn parse_str(&self, xml: &str) -> Result<Vec<CandidateBook>> {
        self.parse_reader(xml.as_bytes())
    }

    /// Parse an ONIX message from any buffered reader
    pub fn parse_reader<R: BufRead>(&self, input: R) -> Result<Vec<CandidateBook>> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::with_capacity(8192);
        let mut state = FeedState::default();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(source) => {
                    return Err(FeedError::Xml {
                        position: reader.error_position(),
                        source,
                    })
                },
            };

            match event {
                Event::Start(ref e) => state.open(e)?,
                Event::Empty(ref e) => {
                    state.open(e)?;
                    state.close();
                },
                Event::Text(ref e) => {
                    let text = e.unescape_with(resolve_entity).map_err(|source| {
                        FeedError::Xml {
                            position: reader.buffer_position(),
                            source,
                        }
                    })?;
                    state.text(&text);
                },
                Event::CData(ref e) => state.text(&String::from_utf8_lossy(e)),
                Event::End(_) => state.close(),
                Event::Eof => break,
                _ => {},
            }

            buf.clear();
        }

        state.finish()
    }
}

// ============================================================================
// Document State
// ============================================================================

#[derive(Debug)]
struct Frame {
    tag: String,
    text: String,
}

impl Frame {
    fn new(tag: String) -> Self {
        Self {
            tag,
            text: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    stack: Vec<Frame>,
    root_seen: bool,
    release: Option<String>,
    product: Option<ProductBuilder>,
    /// Nesting depth inside an ignored subtree of the current product
    ignored_depth: usize,
    /// Stack index of a `Text` element whose XHTML content is being flattened
    capture: Option<usize>,
    books: Vec<CandidateBook>,
}

impl FeedState {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let tag = canonical_tag(start.local_name().as_ref());

        if self.stack.is_empty() {
            if tag != MESSAGE_TAG {
                return Err(FeedError::NotOnix(tag));
            }
            self.root_seen = true;
            self.release = release_attribute(start);
            self.stack.push(Frame::new(tag));
            return Ok(());
        }

        if let Some(index) = self.capture {
            if BLOCK_ELEMENTS.contains(&tag.as_str()) {
                self.stack[index].text.push(' ');
            }
            self.stack.push(Frame::new(tag));
            return Ok(());
        }

        let depth = self.stack.len();
        if self.product.is_none() {
            if tag == PRODUCT_TAG {
                self.product = Some(ProductBuilder::default());
            }
        } else if IGNORED_CONTEXTS.contains(&tag.as_str()) {
            self.ignored_depth += 1;
        } else if self.ignored_depth == 0 {
            if let Some(product) = self.product.as_mut() {
                match product.composite.as_ref().map(|c| c.kind) {
                    None => product.composite = Composite::open(&tag),
                    Some(CompositeKind::Text) if tag == TEXT_TAG => self.capture = Some(depth),
                    Some(_) => {},
                }
            }
        }

        self.stack.push(Frame::new(tag));
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let target = match self.capture {
            Some(index) => self.stack.get_mut(index),
            None => self.stack.last_mut(),
        };
        if let Some(frame) = target {
            frame.text.push_str(text);
        }
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let depth = self.stack.len();

        if let Some(index) = self.capture {
            if depth > index {
                if BLOCK_ELEMENTS.contains(&frame.tag.as_str()) {
                    self.stack[index].text.push(' ');
                }
                return;
            }
            self.capture = None;
        }

        if self.product.is_none() {
            return;
        }

        if self.ignored_depth > 0 {
            if IGNORED_CONTEXTS.contains(&frame.tag.as_str()) {
                self.ignored_depth -= 1;
            }
            return;
        }

        if frame.tag == PRODUCT_TAG {
            if let Some(product) = self.product.take() {
                self.books.push(product.finish());
            }
            return;
        }

        if let Some(product) = self.product.as_mut() {
            let value = collapse_whitespace(&frame.text);
            product.accept(frame.tag, value);
        }
    }

    fn finish(self) -> Result<Vec<CandidateBook>> {
        if !self.root_seen {
            return Err(FeedError::Empty);
        }
        if let Some(open) = self.stack.last() {
            return Err(FeedError::Truncated {
                open: open.tag.clone(),
            });
        }

        debug!(
            release = self.release.as_deref().unwrap_or("2.1"),
            products = self.books.len(),
            "Parsed ONIX message"
        );

        Ok(self.books)
    }
}

fn release_attribute(start: &BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"release")
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

// ============================================================================
// Composites
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompositeKind {
    Identifier,
    Contributor,
    Text,
    Resource,
    MediaFile,
    Subject,
    PublishingDate,
}

/// A repeating product element whose children only make sense together
#[derive(Debug)]
struct Composite {
    kind: CompositeKind,
    opener: String,
    fields: HashMap<String, String>,
}

impl Composite {
    fn open(tag: &str) -> Option<Self> {
        let kind = match tag {
            "ProductIdentifier" => CompositeKind::Identifier,
            "Contributor" => CompositeKind::Contributor,
            "TextContent" | "OtherText" => CompositeKind::Text,
            "SupportingResource" => CompositeKind::Resource,
            "MediaFile" => CompositeKind::MediaFile,
            "Subject" | "MainSubject" => CompositeKind::Subject,
            "PublishingDate" => CompositeKind::PublishingDate,
            _ => return None,
        };
        Some(Self {
            kind,
            opener: tag.to_string(),
            fields: HashMap::new(),
        })
    }

    /// First non-empty value wins
    fn set(&mut self, tag: String, value: String) {
        match self.fields.entry(tag) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_empty() {
                    entry.insert(value);
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(value);
            },
        }
    }

    fn get(&self, tag: &str) -> Option<&str> {
        self.fields
            .get(tag)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn has(&self, tag: &str) -> bool {
        self.fields.contains_key(tag)
    }
}

#[derive(Debug)]
struct TextEntry {
    legacy: bool,
    text_type: Option<String>,
    text: String,
}

#[derive(Debug)]
struct SubjectEntry {
    scheme: Option<String>,
    code: Option<String>,
    heading: Option<String>,
    main: bool,
}

// ============================================================================
// Product Assembly
// ============================================================================

#[derive(Debug, Default)]
struct ProductBuilder {
    book: CandidateBook,
    composite: Option<Composite>,
    gtin13: Option<String>,
    title_text: Option<String>,
    title_prefix: Option<String>,
    title_without_prefix: Option<String>,
    distinctive_title: Option<String>,
    imprint: Option<String>,
    contributors_seen: i64,
    texts: Vec<TextEntry>,
    subjects: Vec<SubjectEntry>,
    publishing_dates: Vec<(Option<String>, String)>,
    legacy_publication_date: Option<String>,
    basic_main_subject: Option<String>,
}

fn set_first(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

impl ProductBuilder {
    fn accept(&mut self, tag: String, value: String) {
        if let Some(composite) = self.composite.as_mut() {
            if composite.opener == tag {
                if let Some(done) = self.composite.take() {
                    self.close_composite(done);
                }
            } else {
                composite.set(tag, value);
            }
            return;
        }

        match tag.as_str() {
            "RecordReference" => set_first(&mut self.book.record_reference, value),
            "NotificationType" => set_first(&mut self.book.notification_type, value),
            "ISBN" => set_first(&mut self.book.isbn10, clean_identifier(&value)),
            "EAN13" => {
                let ean = clean_identifier(&value);
                if is_bookland(&ean) {
                    set_first(&mut self.gtin13, ean);
                }
            },
            "TitleText" => set_first(&mut self.title_text, value),
            "TitlePrefix" => set_first(&mut self.title_prefix, value),
            "TitleWithoutPrefix" => set_first(&mut self.title_without_prefix, value),
            "DistinctiveTitle" => set_first(&mut self.distinctive_title, value),
            "PublisherName" => set_first(&mut self.book.publisher, value),
            "ImprintName" => set_first(&mut self.imprint, value),
            "PriceAmount" => set_first(&mut self.book.price, value),
            "PublicationDate" => set_first(&mut self.legacy_publication_date, value),
            "BASICMainSubject" => set_first(&mut self.basic_main_subject, value),
            _ => {},
        }
    }

    fn close_composite(&mut self, composite: Composite) {
        match composite.kind {
            CompositeKind::Identifier => {
                let Some(value) = composite.get("IDValue").map(clean_identifier) else {
                    return;
                };
                match composite.get("ProductIDType") {
                    Some("15") => set_first(&mut self.book.isbn13, value),
                    Some("02") => set_first(&mut self.book.isbn10, value),
                    Some("03") if is_bookland(&value) => set_first(&mut self.gtin13, value),
                    _ => {},
                }
            },
            CompositeKind::Contributor => {
                self.contributors_seen += 1;
                let Some(name) = contributor_name(&composite) else {
                    debug!(
                        record_reference = self.book.record_reference.as_deref(),
                        "Dropping contributor without a name"
                    );
                    return;
                };
                self.book.contributors.push(CandidateContributor {
                    name,
                    role: composite
                        .get("ContributorRole")
                        .unwrap_or_default()
                        .to_string(),
                    sequence_number: composite
                        .get("SequenceNumber")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(self.contributors_seen),
                    biography: composite.get("BiographicalNote").map(str::to_string),
                });
            },
            CompositeKind::Text => {
                if let Some(text) = composite.get(TEXT_TAG) {
                    self.texts.push(TextEntry {
                        legacy: composite.opener == "OtherText",
                        text_type: composite
                            .get("TextType")
                            .or_else(|| composite.get("TextTypeCode"))
                            .map(str::to_string),
                        text: text.to_string(),
                    });
                }
            },
            CompositeKind::Resource => {
                if composite.get("ResourceContentType") == Some("01") {
                    if let Some(link) = composite.get("ResourceLink") {
                        set_first(&mut self.book.cover_image_url, link.to_string());
                    }
                }
            },
            CompositeKind::MediaFile => {
                if matches!(composite.get("MediaFileTypeCode"), Some("04") | Some("06")) {
                    if let Some(link) = composite.get("MediaFileLink") {
                        set_first(&mut self.book.cover_image_url, link.to_string());
                    }
                }
            },
            CompositeKind::Subject => {
                self.subjects.push(SubjectEntry {
                    scheme: composite
                        .get("SubjectSchemeIdentifier")
                        .or_else(|| composite.get("MainSubjectSchemeIdentifier"))
                        .map(str::to_string),
                    code: composite.get("SubjectCode").map(str::to_string),
                    heading: composite.get("SubjectHeadingText").map(str::to_string),
                    main: composite.opener == "MainSubject" || composite.has("MainSubject"),
                });
            },
            CompositeKind::PublishingDate => {
                if let Some(date) = composite.get("Date") {
                    self.publishing_dates.push((
                        composite.get("PublishingDateRole").map(str::to_string),
                        date.to_string(),
                    ));
                }
            },
        }
    }

    fn finish(self) -> CandidateBook {
        let mut book = self.book;

        book.isbn13 = book.isbn13.or(self.gtin13);
        book.title = self
            .title_text
            .or(match (self.title_prefix, self.title_without_prefix) {
                (Some(prefix), Some(rest)) => Some(format!("{} {}", prefix, rest)),
                (None, Some(rest)) => Some(rest),
                _ => None,
            })
            .or(self.distinctive_title);
        book.publisher = book.publisher.or(self.imprint);
        book.description = pick_description(&self.texts);
        book.publication_date = self
            .publishing_dates
            .iter()
            .find(|(role, _)| role.as_deref() == Some("01"))
            .or(self.publishing_dates.first())
            .map(|(_, date)| date.clone())
            .or(self.legacy_publication_date)
            .map(|date| normalize_date(&date));
        book.keywords = collect_keywords(&self.subjects);
        book.genre = pick_genre(&self.subjects).or(self.basic_main_subject);

        book
    }
}

fn contributor_name(composite: &Composite) -> Option<String> {
    if let Some(name) = composite.get("PersonName") {
        return Some(name.to_string());
    }
    match (composite.get("NamesBeforeKey"), composite.get("KeyNames")) {
        (Some(before), Some(key)) => return Some(format!("{} {}", before, key)),
        (None, Some(key)) => return Some(key.to_string()),
        _ => {},
    }
    composite
        .get("CorporateName")
        .or_else(|| composite.get("PersonNameInverted"))
        .map(str::to_string)
}

/// Main description first (3.0 type 03, 2.1 types 01/03), short description second
fn pick_description(texts: &[TextEntry]) -> Option<String> {
    texts
        .iter()
        .filter_map(|entry| {
            let rank = match (entry.legacy, entry.text_type.as_deref()) {
                (false, Some("03")) | (true, Some("01")) | (true, Some("03")) => 0,
                (_, Some("02")) => 1,
                _ => return None,
            };
            Some((rank, entry))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, entry)| entry.text.clone())
}

/// Keyword subjects (scheme 20), split on `;` and `,`, de-duplicated in order
fn collect_keywords(subjects: &[SubjectEntry]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for subject in subjects.iter().filter(|s| s.scheme.as_deref() == Some("20")) {
        let Some(heading) = subject.heading.as_deref().or(subject.code.as_deref()) else {
            continue;
        };
        for keyword in heading.split([';', ',']).map(str::trim) {
            if !keyword.is_empty() && !keywords.iter().any(|k| k == keyword) {
                keywords.push(keyword.to_string());
            }
        }
    }
    keywords
}

/// BISAC subject (scheme 10), main subject preferred
fn pick_genre(subjects: &[SubjectEntry]) -> Option<String> {
    let mut bisac = subjects
        .iter()
        .filter(|s| s.scheme.as_deref() == Some("10"));
    let chosen = bisac
        .clone()
        .find(|s| s.main)
        .or_else(|| bisac.next())?;
    chosen.heading.clone().or_else(|| chosen.code.clone())
}

// ============================================================================
// Value Normalization
// ============================================================================

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_identifier(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

fn is_bookland(ean: &str) -> bool {
    ean.len() == 13
        && ean.bytes().all(|b| b.is_ascii_digit())
        && (ean.starts_with("978") || ean.starts_with("979"))
}

/// `YYYYMMDD` -> `YYYY-MM-DD`, `YYYYMM` -> `YYYY-MM`; anything else unchanged
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }

    let number = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();

    match raw.len() {
        8 => {
            let date = number(0..4).zip(number(4..6)).zip(number(6..8)).and_then(
                |((year, month), day)| NaiveDate::from_ymd_opt(year as i32, month, day),
            );
            match date {
                Some(date) => date.format("%Y-%m-%d").to_string(),
                None => raw.to_string(),
            }
        },
        6 => match number(4..6) {
            Some(1..=12) => format!("{}-{}", &raw[..4], &raw[4..]),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}
