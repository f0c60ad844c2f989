//! Common types used across zipflow
//!
//! These are the validated values a parsed input row is made of. Construction
//! goes through [`std::str::FromStr`], so anything holding a [`PostalCode`] or
//! an [`EmailAddress`] can rely on its shape.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of digits in a US postal code.
pub const POSTAL_CODE_LEN: usize = 5;

/// A five digit US postal code.
///
/// Leading zeros are significant, so the value is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PostalCode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() == POSTAL_CODE_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(CommonError::InvalidPostalCode(trimmed.to_string()))
        }
    }
}

impl TryFrom<String> for PostalCode {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PostalCode> for String {
    fn from(value: PostalCode) -> Self {
        value.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A syntactically plausible email address.
///
/// Only the outline is checked: a non-empty local part, a single separating
/// `@` and a non-empty domain, with no whitespace. Deliverability is the
/// transport's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part after the `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, d)| d).unwrap_or_default()
    }
}

impl FromStr for EmailAddress {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || CommonError::InvalidEmail(trimmed.to_string());

        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (local, domain) = trimmed.rsplit_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.is_empty() || local.contains('@') {
            return Err(invalid());
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Place resolved from a postal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// State name, e.g. "California"
    pub state: String,

    /// Place name, e.g. "Beverly Hills"
    pub city: String,
}

impl Location {
    pub fn new(state: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            city: city.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_postal_code_accepts_five_digits() {
        let zip: PostalCode = " 02134 ".parse().unwrap();
        assert_eq!(zip.as_str(), "02134");
        assert_eq!(zip.to_string(), "02134");
    }

    #[test]
    fn test_postal_code_rejects_bad_shapes() {
        for bad in ["", "1234", "123456", "9021a", "90-10", "９０２１０"] {
            assert!(bad.parse::<PostalCode>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_postal_code_error_message() {
        let err = "abc".parse::<PostalCode>().unwrap_err();
        assert_eq!(err.to_string(), "invalid zip code 'abc': expected exactly 5 digits");
    }

    #[test]
    fn test_email_accepts_plain_address() {
        let email: EmailAddress = "user@example.com".parse().unwrap();
        assert_eq!(email.as_str(), "user@example.com");
        assert_eq!(email.domain(), "example.com");
    }

    #[test]
    fn test_email_rejects_bad_shapes() {
        for bad in ["", "user", "@example.com", "user@", "a b@example.com", "a@b@c"] {
            assert!(bad.parse::<EmailAddress>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_serde_goes_through_validation() {
        let zip: PostalCode = serde_json::from_str("\"90210\"").unwrap();
        assert_eq!(zip.as_str(), "90210");
        assert!(serde_json::from_str::<PostalCode>("\"nope\"").is_err());
    }

    #[test]
    fn test_location_display() {
        let loc = Location::new("California", "Beverly Hills");
        assert_eq!(loc.to_string(), "Beverly Hills, California");
    }
}
