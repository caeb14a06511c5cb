//! Serialisable factory configuration.
//!
//! Loaded by the composition root (the CLI reads it from a JSON file); this
//! crate only parses and validates it.

use serde::{Deserialize, Serialize};

use crate::retry::RetrySettings;
use crate::{ContextError, ContextOptions, ServiceUri, ServiceVersion};

/// The public logical entry point of the service.
pub const DEFAULT_SERVICE_URI: &str = "https://media.windows.net/";

/// Default transport timeout for a single request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 100;

/// Everything needed to construct a [`crate::ContextFactory`] apart from the
/// credential and the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Logical service URI to probe.
    pub service_uri: String,
    /// Value written to `x-ms-version`.
    pub service_version: ServiceVersion,
    /// Probe retry settings.
    pub retry: RetrySettings,
    /// Per-request transport timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Flags applied to every built context.
    pub context: ContextOptions,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            service_uri: DEFAULT_SERVICE_URI.to_string(),
            service_version: ServiceVersion::default(),
            retry: RetrySettings::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            context: ContextOptions::default(),
        }
    }
}

impl FactoryConfig {
    /// Parses a JSON document. Absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ContextError::Configuration`] for malformed JSON or invalid values.
    pub fn from_json(text: &str) -> Result<Self, ContextError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ContextError::Configuration {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants and returns the parsed service URI.
    ///
    /// # Errors
    ///
    /// [`ContextError::Configuration`] describing the first violation found.
    pub fn validate(&self) -> Result<ServiceUri, ContextError> {
        if self.retry.max_attempts == 0 {
            return Err(configuration("retry.max_attempts must be at least 1"));
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(configuration(
                "retry.min_backoff_ms must not exceed retry.max_backoff_ms",
            ));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(configuration("retry.multiplier must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.randomization_factor) {
            return Err(configuration(
                "retry.randomization_factor must be between 0 and 1",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(configuration("request_timeout_secs must be positive"));
        }
        ServiceUri::parse(&self.service_uri).map_err(|e| ContextError::Configuration {
            message: format!("service_uri: {e}"),
        })
    }
}

fn configuration(message: &str) -> ContextError {
    ContextError::Configuration {
        message: message.to_string(),
    }
}
