//! Entity code and display label extraction.
//!
//! Both values go through the same four stages, first hit wins:
//! 1. elements whose local name is on a priority list (case-insensitive),
//! 2. elements whose local name contains a known fragment,
//! 3. ordered regular expressions over the raw text,
//! 4. a loose raw-text scan.
//!
//! Stages 1 and 2 need a well-formed tree and are skipped otherwise.

use crate::document;
use docward_types::EntityCode;
use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Label used when no stage finds a name.
pub const UNKNOWN_LABEL: &str = "Unknown";

const MIN_ID_DIGITS: usize = 10;
const MIN_LABEL_CHARS: usize = 6;

const ID_TAGS: &[&str] = &["mst", "taxcode", "mannt", "mannhan"];
const ID_TAG_FRAGMENTS: &[&[&str]] = &[&["mannhan", "mannt"], &["masothue", "mst"]];

const LABEL_TAGS: &[&str] = &[
    "tennnt",
    "companyname",
    "tencongty",
    "tendonvi",
    "tennnhan",
    "hotennntkhai",
    "tentochuc",
];
const LABEL_TAG_FRAGMENTS: &[&[&str]] = &[&["tennnhan", "tennnt"]];

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)<mst>\s*(\d{10,13})\s*</mst>",
        r"(?i)<maNNhan>\s*(\d{10,13})\s*</maNNhan>",
        r"(?i)<maNNT>\s*(\d{10,13})\s*</maNNT>",
        r"(?i)<maSoThue>\s*(\d{10,13})\s*</maSoThue>",
        r"(?i)MST:\s*(\d{10,13})\b",
        r#"(?i)taxCode["'>:\s]+(\d{10,13})\b"#,
    ])
});

static ID_DIGIT_RUN: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[r"\b(\d{10,13})\b"]));

static LABEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?is)<tenNNT>(.*?)</tenNNT>",
        r"(?is)<tenNNhan>(.*?)</tenNNhan>",
        r"(?is)<companyName>(.*?)</companyName>",
        r"(?is)<tenCongTy>(.*?)</tenCongTy>",
        r"(?is)<hoTenNNTKhai>(.*?)</hoTenNNTKhai>",
        r"(?is)<tenToChuc>(.*?)</tenToChuc>",
    ])
});

static LABEL_LOOSE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"((?:CÔNG TY|Công ty|công ty|(?i:company))\s+[^<>\r\n]{2,120})"])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern, "skipping invalid extraction pattern: {e}");
                None
            }
        })
        .collect()
}

/// Which stage produced the entity code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Tag,
    TagFragment,
    Pattern,
    DigitRun,
}

/// What the extractor learned about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// `None` means the document cannot be classified.
    pub entity_id: Option<EntityCode>,
    pub display_label: String,
    pub id_stage: Option<ExtractionStage>,
}

impl Fingerprint {
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.entity_id.is_some()
    }
}

/// Returns true if `id` is a well-formed entity code.
#[must_use]
pub fn validate_id(id: &str) -> bool {
    EntityCode::is_valid(id)
}

/// Extracts the entity code and display label of a document.
#[must_use]
pub fn extract(bytes: &[u8]) -> Fingerprint {
    let text = document::decode(bytes);
    let tree = document::parse(&text);

    let (entity_id, id_stage) = match extract_id(tree.as_ref(), &text) {
        Some((id, stage)) => (Some(id), Some(stage)),
        None => (None, None),
    };
    let display_label =
        extract_label(tree.as_ref(), &text).unwrap_or_else(|| UNKNOWN_LABEL.to_string());

    Fingerprint {
        entity_id,
        display_label,
        id_stage,
    }
}

// ── Entity code ──────────────────────────────────────────────────

fn extract_id(
    tree: Option<&roxmltree::Document<'_>>,
    text: &str,
) -> Option<(EntityCode, ExtractionStage)> {
    let by_tag = || tree.and_then(|doc| scan_tags(doc, ID_TAGS, id_from_element));
    let by_fragment =
        || tree.and_then(|doc| scan_fragments(doc, ID_TAG_FRAGMENTS, id_from_element));

    by_tag()
        .map(|id| (id, ExtractionStage::Tag))
        .or_else(|| by_fragment().map(|id| (id, ExtractionStage::TagFragment)))
        .or_else(|| {
            first_capture(&ID_PATTERNS, text, id_from_capture)
                .map(|id| (id, ExtractionStage::Pattern))
        })
        .or_else(|| {
            first_capture(&ID_DIGIT_RUN, text, id_from_capture)
                .map(|id| (id, ExtractionStage::DigitRun))
        })
}

/// Digits of an element's text, as a code when there are enough of them.
fn id_from_element(text: &str) -> Option<EntityCode> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_ID_DIGITS {
        return None;
    }
    EntityCode::parse(&digits).ok()
}

fn id_from_capture(capture: &str) -> Option<EntityCode> {
    EntityCode::parse(capture).ok()
}

// ── Display label ────────────────────────────────────────────────

fn extract_label(tree: Option<&roxmltree::Document<'_>>, text: &str) -> Option<String> {
    tree.and_then(|doc| scan_tags(doc, LABEL_TAGS, label_from_text))
        .or_else(|| {
            tree.and_then(|doc| scan_fragments(doc, LABEL_TAG_FRAGMENTS, label_from_text))
        })
        .or_else(|| first_capture(&LABEL_PATTERNS, text, label_from_text))
        .or_else(|| first_capture(&LABEL_LOOSE, text, label_from_text))
}

fn label_from_text(text: &str) -> Option<String> {
    let label = text.trim();
    (label.chars().count() >= MIN_LABEL_CHARS).then(|| label.to_string())
}

// ── Shared stage drivers ─────────────────────────────────────────

/// Stage 1: for each priority name in order, every element with that name.
fn scan_tags<T>(
    doc: &roxmltree::Document<'_>,
    names: &[&str],
    accept: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    names.iter().find_map(|name| {
        doc.descendants()
            .filter(|node| node.is_element() && document::local_name(*node) == *name)
            .find_map(|node| node.text().and_then(&accept))
    })
}

/// Stage 2: for each fragment group in order, every element whose name
/// contains one of the group's fragments.
fn scan_fragments<T>(
    doc: &roxmltree::Document<'_>,
    groups: &[&[&str]],
    accept: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    groups.iter().find_map(|group| {
        doc.descendants()
            .filter(|node| {
                node.is_element() && {
                    let name = document::local_name(*node);
                    group.iter().any(|fragment| name.contains(fragment))
                }
            })
            .find_map(|node| node.text().and_then(&accept))
    })
}

/// Stages 3 and 4: the first capture of the first pattern that yields a value.
fn first_capture<T>(
    patterns: &[Regex],
    text: &str,
    accept: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| accept(m.as_str()))
    })
}
