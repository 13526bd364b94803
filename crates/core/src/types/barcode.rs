//! Barcode type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Barcode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BarcodeError {
    /// The input is empty or only whitespace.
    #[error("barcode cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("barcode must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// The unique key of a product in the local catalog.
///
/// Barcodes are opaque strings (EAN-13, UPC-A, internal PLU codes, ...). The only
/// constraints are that they are non-blank and reasonably short; surrounding
/// whitespace from scanners is trimmed.
///
/// ## Examples
///
/// ```
/// use pricecheck_core::Barcode;
///
/// assert_eq!(Barcode::parse(" 4006381333931\n").unwrap().as_str(), "4006381333931");
/// assert!(Barcode::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Barcode(String);

impl Barcode {
    /// Maximum length of a barcode.
    pub const MAX_LENGTH: usize = 64;

    /// Parse a `Barcode` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty or longer than
    /// [`Barcode::MAX_LENGTH`] characters.
    pub fn parse(s: &str) -> Result<Self, BarcodeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BarcodeError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(BarcodeError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the barcode as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Barcode` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Barcode {
    type Error = BarcodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Barcode> for String {
    fn from(barcode: Barcode) -> Self {
        barcode.0
    }
}

impl std::str::FromStr for Barcode {
    type Err = BarcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
