//! Device identifier type.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur when parsing a [`DeviceIdentifier`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdentifierError {
    /// The input is empty or only whitespace.
    #[error("device identifier cannot be empty")]
    Empty,
    /// The input is neither a UUID nor a reserved identifier.
    #[error("device identifier must be a UUID or a reserved identifier, got {0:?}")]
    Malformed(String),
}

/// A stable identifier naming one client installation to the backend.
///
/// Installed measurement devices carry a random version-4 UUID in the standard
/// 36-character hyphenated layout. Two reserved literals identify contexts that
/// are not installed devices (the back-office dashboard and the desktop build);
/// those must never be registered or send heartbeats.
///
/// ## Examples
///
/// ```
/// use pricecheck_core::DeviceIdentifier;
///
/// let id = DeviceIdentifier::generate();
/// assert_eq!(id.as_str().len(), 36);
/// assert!(!id.is_reserved());
///
/// assert!(DeviceIdentifier::parse("admin").unwrap().is_reserved());
/// assert!(DeviceIdentifier::parse("not-a-device").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    /// Identifier used by back-office (administrative) sessions.
    pub const ADMIN: &'static str = "admin";

    /// Identifier used by the desktop build.
    pub const DESKTOP: &'static str = "desktop";

    /// Mint a new random version-4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Parse an identifier read from storage or configuration.
    ///
    /// UUIDs are normalised to lowercase hyphenated form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is blank or is neither a UUID nor one of the
    /// reserved identifiers.
    pub fn parse(s: &str) -> Result<Self, DeviceIdentifierError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DeviceIdentifierError::Empty);
        }
        if trimmed == Self::ADMIN || trimmed == Self::DESKTOP {
            return Ok(Self(trimmed.to_owned()));
        }
        Uuid::try_parse(trimmed)
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|_| DeviceIdentifierError::Malformed(trimmed.to_owned()))
    }

    /// Whether this is one of the reserved non-device identifiers.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::ADMIN || self.0 == Self::DESKTOP
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceIdentifier {
    type Error = DeviceIdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceIdentifier> for String {
    fn from(id: DeviceIdentifier) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_standard_layout() {
        let id = DeviceIdentifier::generate();
        let s = id.as_str();
        assert_eq!(s.len(), 36);
        let groups: Vec<&str> = s.split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        // Version nibble
        assert_eq!(groups[2].chars().next(), Some('4'));
        // Variant nibble is one of 8, 9, a, b
        assert!(matches!(
            groups[3].chars().next(),
            Some('8' | '9' | 'a' | 'b')
        ));
    }

    #[test]
    fn test_generate_is_random() {
        assert_ne!(DeviceIdentifier::generate(), DeviceIdentifier::generate());
    }

    #[test]
    fn test_reserved_identifiers() {
        assert!(DeviceIdentifier::parse("admin").unwrap().is_reserved());
        assert!(DeviceIdentifier::parse("desktop").unwrap().is_reserved());
        assert!(!DeviceIdentifier::generate().is_reserved());
    }

    #[test]
    fn test_parse_normalises_case() {
        let id = DeviceIdentifier::parse("9F0C3A52-1B7D-4E2A-8C11-2B0E5D6F7A88").unwrap();
        assert_eq!(id.as_str(), "9f0c3a52-1b7d-4e2a-8c11-2b0e5d6f7a88");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(DeviceIdentifier::parse(" "), Err(DeviceIdentifierError::Empty));
        assert!(matches!(
            DeviceIdentifier::parse("kiosk-7"),
            Err(DeviceIdentifierError::Malformed(_))
        ));
    }
}
