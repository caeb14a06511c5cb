//! The transport port: one outgoing request in, one response out.
//!
//! Infrastructure crates implement [`Transport`] (see the `http-transport`
//! crate). The same transport instance serves the resolution probe and every
//! context the factory builds.

use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use url::Url;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A request about to be sent, open to mutation by [`crate::RequestDecorator`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URI.
    pub uri: Url,
    /// Request headers. Decorators write here.
    pub headers: HeaderMap,
    /// Optional request body (JSON for data operations).
    pub body: Option<Vec<u8>>,
    /// Whether the transport may follow redirects on its own.
    ///
    /// The resolution probe sets this to `false` so it can observe the
    /// redirect response itself.
    pub follow_redirects: bool,
}

impl OutgoingRequest {
    /// Creates a body-less request that follows redirects.
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
            follow_redirects: true,
        }
    }

    /// Sets or replaces a header. A later write to the same name wins.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A fully received response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The URI that actually produced this response, after any
    /// transport-level canonicalisation.
    pub final_uri: Url,
    /// Response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established (DNS, refused, TLS handshake).
    Connect,
    /// The request or response did not complete in time.
    Timeout,
    /// An established connection was closed mid-exchange.
    ConnectionReset,
    /// The peer violated HTTP framing or the request could not be encoded.
    Protocol,
    /// Anything the transport could not classify.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection reset",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// A failure to deliver a request or receive its response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Creates a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the failure category.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns `true` for failures a retry can plausibly fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect
                | TransportErrorKind::Timeout
                | TransportErrorKind::ConnectionReset
        )
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Sends one request and returns the complete response.
///
/// Implementations must honour [`OutgoingRequest::follow_redirects`]: when it
/// is `false`, a `3xx` response is returned to the caller as-is.
///
/// Non-success statuses are responses, not errors; only failures to complete
/// the exchange are reported as [`TransportError`].
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs the exchange, blocking the calling thread until it completes.
    fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError>;
}
