//! Shape-based document comparison.
//!
//! A document's structural signature lists, for every element in pre-order,
//! its local tag name followed by its attribute names in sorted order. Text
//! and attribute values are never looked at, so two invoices with different
//! amounts but the same layout compare as identical.

use crate::document;
use std::collections::HashSet;

/// Threshold for best-effort restore decisions in the watch loop.
pub const RESTORE_THRESHOLD: f64 = 0.7;

/// Stricter threshold for "is this the same template" checks at registration.
pub const TEMPLATE_THRESHOLD: f64 = 0.8;

/// Ordered structural tokens of one parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralSignature {
    tokens: Vec<String>,
}

impl StructuralSignature {
    /// Computes the signature, or `None` if the bytes do not parse.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Option<Self> {
        let text = document::decode(bytes);
        let doc = document::parse(&text)?;

        let mut tokens = Vec::new();
        for node in doc.root().descendants().filter(|n| n.is_element()) {
            tokens.push(node.tag_name().name().to_string());
            let mut attrs: Vec<&str> = node.attributes().map(|a| a.name()).collect();
            attrs.sort_unstable();
            tokens.extend(attrs.into_iter().map(str::to_string));
        }
        Some(Self { tokens })
    }

    /// Tokens in document order, duplicates included.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Jaccard index of the two token sets.
    #[must_use]
    pub fn jaccard(&self, other: &Self) -> f64 {
        let a: HashSet<&str> = self.tokens.iter().map(String::as_str).collect();
        let b: HashSet<&str> = other.tokens.iter().map(String::as_str).collect();

        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        let common = a.intersection(&b).count();
        common as f64 / union as f64
    }

    /// True iff the similarity is strictly above `threshold`.
    #[must_use]
    pub fn matches(&self, other: &Self, threshold: f64) -> bool {
        self.jaccard(other) > threshold
    }
}

/// Structural similarity in `[0, 1]`. Unparsable input scores `0.0`.
#[must_use]
pub fn similarity(a: &[u8], b: &[u8]) -> f64 {
    match (StructuralSignature::of(a), StructuralSignature::of(b)) {
        (Some(sa), Some(sb)) => sa.jaccard(&sb),
        _ => 0.0,
    }
}

/// True iff `similarity(a, b) > threshold`.
#[must_use]
pub fn is_match(a: &[u8], b: &[u8], threshold: f64) -> bool {
    similarity(a, b) > threshold
}
