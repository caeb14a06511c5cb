//! Blocking HTTP transport over `reqwest`.
//!
//! [`ReqwestTransport`] implements the [`context::Transport`] port. It holds
//! two clients built from the same settings: one that follows redirects and
//! one that never does. Each request picks its client from
//! [`OutgoingRequest::follow_redirects`], which is how the endpoint probe
//! observes the raw `301` while ordinary data requests behave normally.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Nothing here knows about endpoints, decorators, or
//! retries. Failures are classified into [`TransportErrorKind`] so the
//! domain's retry policy can decide what is transient.

use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use context::{
    OutgoingRequest, Transport, TransportError, TransportErrorKind, TransportResponse,
};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::{debug, warn};

/// Default `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("amsctx/", env!("CARGO_PKG_VERSION"));

/// Failure to build the underlying HTTP clients.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct BuildError(#[from] reqwest::Error);

/// [`Transport`] backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: Client,
    direct: Client,
}

impl ReqwestTransport {
    /// Builds a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// [`BuildError`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, BuildError> {
        Ok(Self {
            following: client(timeout, Policy::default())?,
            direct: client(timeout, Policy::none())?,
        })
    }

    /// Builds a transport from a timeout in whole seconds, as carried by
    /// `FactoryConfig::request_timeout_secs`.
    ///
    /// # Errors
    ///
    /// See [`ReqwestTransport::new`].
    pub fn with_timeout_secs(secs: u64) -> Result<Self, BuildError> {
        Self::new(Duration::from_secs(secs))
    }
}

fn client(timeout: Duration, redirects: Policy) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .redirect(redirects)
        .user_agent(USER_AGENT)
        .build()
}

impl Transport for ReqwestTransport {
    fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        let OutgoingRequest {
            method,
            uri,
            headers,
            body,
            follow_redirects,
        } = request;

        let client = if follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let started = Instant::now();
        let mut builder = client.request(method.clone(), uri.clone()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| {
            let error = classify(&e);
            warn!(%method, %uri, kind = %error.kind(), error = %e, "request failed");
            error
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_uri = response.url().clone();
        let body = response.bytes().map_err(|e| classify(&e))?.to_vec();

        debug!(
            %method,
            %uri,
            %final_uri,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        Ok(TransportResponse {
            status,
            headers,
            final_uri,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Maps a `reqwest` failure onto the transport's error categories.
pub fn classify(error: &reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if matches!(
        io_error_kind(error),
        Some(
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    ) {
        TransportErrorKind::ConnectionReset
    } else if error.is_builder() || error.is_redirect() || error.is_decode() {
        TransportErrorKind::Protocol
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, error.to_string())
}

/// The kind of the first `io::Error` in the source chain, if any.
fn io_error_kind(error: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        current = e.source();
    }
    None
}
