//! Company identifier (CIK) normalization.
//!
//! Every identifier that crosses a component boundary goes through [`Cik`],
//! so cache keys, checkpoint keys and API URLs all agree on the same
//! 10-digit zero-padded form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CikError;

/// Width of the canonical, zero-padded identifier.
pub const CIK_WIDTH: usize = 10;

/// A normalized Central Index Key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cik(String);

impl Cik {
    /// Parse and normalize a textual identifier.
    ///
    /// Accepts surrounding whitespace and an optional `CIK` prefix
    /// (`"CIK0000320193"`), then left-pads with zeros to 10 digits.
    pub fn parse(raw: &str) -> Result<Self, CikError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("CIK")
            .or_else(|| trimmed.strip_prefix("cik"))
            .unwrap_or(trimmed)
            .trim();

        if digits.is_empty() {
            return Err(CikError::Empty);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CikError::NonNumeric(raw.to_string()));
        }

        let significant = digits.trim_start_matches('0');
        if significant.len() > CIK_WIDTH {
            return Err(CikError::TooLong(raw.to_string()));
        }

        Ok(Self(format!("{:0>width$}", significant, width = CIK_WIDTH)))
    }

    /// The canonical 10-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier without padding, as used in archive URLs.
    pub fn unpadded(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }
}

impl TryFrom<u64> for Cik {
    type Error = CikError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::parse(&value.to_string())
    }
}

impl TryFrom<String> for Cik {
    type Error = CikError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Cik {
    type Error = CikError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Cik> for String {
    fn from(cik: Cik) -> Self {
        cik.0
    }
}

impl FromStr for Cik {
    type Err = CikError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cik {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
