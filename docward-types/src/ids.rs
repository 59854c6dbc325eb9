//! Identifier types used throughout docward.
//!
//! An [`EntityCode`] is the business key extracted from a document (a
//! numeric tax code). Warehouse rows are addressed by [`EntryKey`], the pair
//! of entity code and logical file name.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fewest digits a valid entity code may have.
pub const MIN_CODE_DIGITS: usize = 10;
/// Most digits a valid entity code may have.
pub const MAX_CODE_DIGITS: usize = 13;

/// A validated entity identifier: 10 to 13 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityCode(String);

impl EntityCode {
    /// Parses an entity code.
    ///
    /// Surrounding whitespace and the separators `-`, `.` and inner
    /// whitespace are removed first, so `"0101234567-001"` normalizes to
    /// `"0101234567001"`. Anything else that is not a digit is rejected.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '.') && !c.is_whitespace())
            .collect();

        let invalid = |reason| Error::InvalidEntityCode {
            input: input.to_string(),
            reason,
        };

        if normalized.is_empty() {
            return Err(invalid("empty"));
        }
        if !normalized.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("contains non-digit characters"));
        }
        if normalized.len() < MIN_CODE_DIGITS {
            return Err(invalid("fewer than 10 digits"));
        }
        if normalized.len() > MAX_CODE_DIGITS {
            return Err(invalid("more than 13 digits"));
        }
        Ok(Self(normalized))
    }

    /// Returns true if `input` parses as an entity code.
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// Returns the normalized digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityCode> for String {
    fn from(code: EntityCode) -> Self {
        code.0
    }
}

impl AsRef<str> for EntityCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Primary key of a warehouse row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
    pub entity_id: EntityCode,
    pub filename: String,
}

impl EntryKey {
    #[must_use]
    pub fn new(entity_id: EntityCode, filename: impl Into<String>) -> Self {
        Self {
            entity_id,
            filename: filename.into(),
        }
    }

    /// Remote path hint used by sync backends: `<entity_id>/<filename>`.
    #[must_use]
    pub fn locator_hint(&self) -> String {
        format!("{}/{}", self.entity_id, self.filename)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.filename)
    }
}
