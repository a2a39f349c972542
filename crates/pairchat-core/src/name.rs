//! Screen names.
//!
//! A screen name identifies one registered client for the lifetime of its
//! connection. Names arrive as raw protocol lines, so construction trims
//! surrounding whitespace and rejects blank input; everything else the
//! client typed is kept as-is.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Longest accepted screen name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Unique identifier a client registers under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScreenName(String);

impl ScreenName {
    /// Parses a screen name from a raw input line.
    ///
    /// # Errors
    ///
    /// - `DomainError::EmptyName` if the line is blank
    /// - `DomainError::NameTooLong` if the trimmed line exceeds [`MAX_NAME_LEN`]
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyName);
        }
        if trimmed.len() > MAX_NAME_LEN {
            return Err(DomainError::NameTooLong {
                len: trimmed.len(),
                max: MAX_NAME_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScreenName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ScreenName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ScreenName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScreenName> for String {
    fn from(name: ScreenName) -> Self {
        name.0
    }
}
