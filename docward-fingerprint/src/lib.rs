//! Content fingerprinting for docward.
//!
//! Two pure, stateless pieces:
//! - [`extract`] pulls an entity code and a display label out of a
//!   semi-structured document through a prioritized chain of strategies.
//! - [`similarity`] compares the shape of two documents (tags and attribute
//!   names, never values) as a Jaccard index.
//!
//! Nothing here returns an error. Unparsable input degrades to text scanning
//! in the extractor and to a score of `0.0` in the matcher.

mod document;
mod extractor;
mod matcher;

pub use extractor::{extract, validate_id, ExtractionStage, Fingerprint, UNKNOWN_LABEL};
pub use matcher::{
    is_match, similarity, StructuralSignature, RESTORE_THRESHOLD, TEMPLATE_THRESHOLD,
};
