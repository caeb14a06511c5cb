//! Shared value types for the context domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants and participate in request construction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ContextError;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the service REST API, written to the `x-ms-version` header by
/// the service-version decorator.
///
/// Serialised as its `"major.minor"` string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceVersion {
    /// Major version, bumped on breaking changes.
    pub major: u32,
    /// Minor version, bumped on additive changes.
    pub minor: u32,
}

impl ServiceVersion {
    /// The version requested when none is configured.
    pub const DEFAULT: ServiceVersion = ServiceVersion {
        major: 2,
        minor: 19,
    };

    /// Creates a new [`ServiceVersion`].
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for ServiceVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ServiceVersion {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContextError::Configuration {
            message: format!("invalid service version '{s}', expected 'major.minor'"),
        };
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for ServiceVersion {
    type Error = ContextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceVersion> for String {
    fn from(value: ServiceVersion) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_version_parses_and_displays_major_minor() {
        let v: ServiceVersion = "2.7".parse().unwrap();
        assert_eq!(v, ServiceVersion::new(2, 7));
        assert_eq!(v.to_string(), "2.7");
        assert!("2".parse::<ServiceVersion>().is_err());
        assert!("two.seven".parse::<ServiceVersion>().is_err());
    }

    #[test]
    fn service_version_serialises_as_string() {
        let json = serde_json::to_string(&ServiceVersion::new(2, 19)).unwrap();
        assert_eq!(json, "\"2.19\"");
        let back: ServiceVersion = serde_json::from_str("\"2.11\"").unwrap();
        assert_eq!(back, ServiceVersion::new(2, 11));
    }
}
