//! Top-level error and retry-classification types for the context domain.
//!
//! [`ContextError`] covers every failure surfaced by endpoint resolution,
//! context building and data operations. Errors raised by collaborators
//! ([`crate::TransportError`], [`crate::DecoratorError`]) are defined next to
//! the ports that produce them and wrapped here.
//!
//! [`Retryability`] is a cross-cutting concern: any error that participates in
//! retry decisions must be able to produce one.

use http::{Method, StatusCode};
use thiserror::Error;

use crate::{DecoratorError, TransportError};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry.
///
/// Consumed by [`crate::retry::WebTransientErrorDetection`] to decide whether
/// the retry policy may re-run an action.
///
/// - `Retryable`: connection failures, timeouts, resets, and decorator
///   failures the decorator itself marks as transient.
/// - `NonRetryable`: unexpected probe status, malformed redirect, invalid
///   configuration, and everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retryability {
    /// The operation may be retried on the retry strategy's schedule.
    Retryable,
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Context errors
// ---------------------------------------------------------------------------

/// Errors raised while resolving the service endpoint, building a context,
/// or running a data operation through a context.
///
/// A resolution failure aborts factory construction entirely; no factory is
/// produced. A failure inside a context operation affects only that call.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The transport failed to deliver a request or read its response.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A transient failure persisted through every attempt the retry policy allowed.
    #[error("Service unreachable after {attempts} attempt(s): {last}")]
    Connectivity {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The error raised by the final attempt.
        #[source]
        last: Box<ContextError>,
    },

    /// The probe answered `301 Moved Permanently` without a usable `Location`.
    ///
    /// This is a configuration problem on the service side; it is never retried.
    #[error("Malformed redirect from {uri}: {reason}")]
    MalformedRedirect {
        /// The probed URI.
        uri: String,
        /// The raw `Location` header value, if one was present.
        location: Option<String>,
        /// Why the header could not be used.
        reason: String,
    },

    /// The probe answered with a status other than `200 OK` or `301 Moved Permanently`.
    #[error("Unexpected response status {status} from {uri}")]
    UnexpectedStatus {
        /// The status the service returned.
        status: StatusCode,
        /// The probed URI.
        uri: String,
    },

    /// A request decorator refused to decorate a request.
    #[error(transparent)]
    Decorator(#[from] DecoratorError),

    /// A URI could not be parsed or is not usable as a service address.
    #[error("Invalid URI '{value}': {reason}")]
    InvalidUri {
        /// The offending value.
        value: String,
        /// Parser or validation message.
        reason: String,
    },

    /// A response payload carried a property the entity type does not know,
    /// and the context is configured not to ignore such properties.
    #[error("Property '{property}' in entity set '{entity_set}' is not known to the entity type")]
    UnknownProperty {
        /// The entity set being read.
        entity_set: String,
        /// The unrecognised property name.
        property: String,
    },

    /// An entity or payload could not be (de)serialised.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// A data operation received a non-success status.
    #[error("{method} {uri} failed with status {status}")]
    RequestFailed {
        /// HTTP method of the failed request.
        method: Method,
        /// Target URI of the failed request.
        uri: String,
        /// Status returned by the service.
        status: StatusCode,
    },

    /// A change-tracking call conflicts with the entity's tracked state
    /// (e.g. updating an entity already staged for deletion).
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of the conflict.
        message: String,
    },

    /// Factory or context configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ContextError {
    /// Classifies this error for retry purposes.
    pub fn retryability(&self) -> Retryability {
        match self {
            Self::Transport(e) if e.is_transient() => Retryability::Retryable,
            Self::Decorator(e) if e.is_transient() => Retryability::Retryable,
            _ => Retryability::NonRetryable,
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportErrorKind;

    #[test]
    fn transient_transport_errors_are_retryable() {
        for kind in [
            TransportErrorKind::Connect,
            TransportErrorKind::Timeout,
            TransportErrorKind::ConnectionReset,
        ] {
            let err = ContextError::from(TransportError::new(kind, "boom"));
            assert_eq!(err.retryability(), Retryability::Retryable);
        }
    }

    #[test]
    fn protocol_level_failures_are_not_retryable() {
        let status = ContextError::UnexpectedStatus {
            status: StatusCode::NOT_FOUND,
            uri: "https://media.example/".to_string(),
        };
        let redirect = ContextError::MalformedRedirect {
            uri: "https://media.example/".to_string(),
            location: None,
            reason: "missing Location header".to_string(),
        };
        let protocol = ContextError::from(TransportError::new(TransportErrorKind::Protocol, "bad"));
        assert_eq!(status.retryability(), Retryability::NonRetryable);
        assert_eq!(redirect.retryability(), Retryability::NonRetryable);
        assert_eq!(protocol.retryability(), Retryability::NonRetryable);
    }

    #[test]
    fn decorator_errors_follow_their_own_transient_flag() {
        let fatal = ContextError::from(DecoratorError::new("credential", "token expired"));
        let transient =
            ContextError::from(DecoratorError::new("credential", "token endpoint busy").transient());
        assert_eq!(fatal.retryability(), Retryability::NonRetryable);
        assert_eq!(transient.retryability(), Retryability::Retryable);
    }
}
