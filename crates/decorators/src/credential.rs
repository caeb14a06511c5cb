//! Bearer access-token decorator.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use context::{DecoratorError, OutgoingRequest, RequestDecorator, Timestamp};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use tracing::warn;

const NAME: &str = "credential";

/// An access token and its optional expiry.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_on: Option<Timestamp>,
}

impl AccessToken {
    /// A token with no known expiry.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_on: None,
        }
    }

    /// Sets the instant after which the token is no longer accepted.
    #[must_use]
    pub fn expiring_on(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on = Some(Timestamp::from_utc(expires_on));
        self
    }

    /// The raw token.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The expiry, if known.
    pub fn expires_on(&self) -> Option<Timestamp> {
        self.expires_on
    }

    /// Returns `true` if the token has expired as of `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_on.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Supplies the token to attach to a request.
pub trait AccessTokenSource: Send + Sync + fmt::Debug {
    /// Returns the current token.
    ///
    /// Implementations report acquisition problems as [`DecoratorError`],
    /// marking them transient only when a retry could succeed.
    fn access_token(&self) -> Result<AccessToken, DecoratorError>;
}

/// Hands out one fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    /// Wraps `token`.
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl AccessTokenSource for StaticTokenSource {
    fn access_token(&self) -> Result<AccessToken, DecoratorError> {
        Ok(self.token.clone())
    }
}

/// Writes `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AccessTokenDecorator {
    source: Arc<dyn AccessTokenSource>,
}

impl AccessTokenDecorator {
    /// Creates a decorator drawing tokens from `source`.
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self { source }
    }
}

impl RequestDecorator for AccessTokenDecorator {
    fn name(&self) -> &str {
        NAME
    }

    fn decorate(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError> {
        let token = self.source.access_token()?;
        if token.is_expired_at(Timestamp::now()) {
            warn!(expires_on = ?token.expires_on(), "refusing expired access token");
            return Err(DecoratorError::new(NAME, "access token has expired"));
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.value()))
            .map_err(|_| DecoratorError::new(NAME, "access token contains invalid characters"))?;
        value.set_sensitive(true);
        request.set_header(AUTHORIZATION, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use http::Method;

    use super::*;

    fn request() -> OutgoingRequest {
        OutgoingRequest::new(Method::GET, "https://media.example/".parse().unwrap())
    }

    fn decorator(token: AccessToken) -> AccessTokenDecorator {
        AccessTokenDecorator::new(Arc::new(StaticTokenSource::new(token)))
    }

    #[test]
    fn writes_bearer_header_marked_sensitive() {
        let mut req = request();
        decorator(AccessToken::new("abc").expiring_on(Utc::now() + Duration::hours(1)))
            .decorate(&mut req)
            .unwrap();
        let header = req.headers.get(AUTHORIZATION).unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer abc");
        assert!(header.is_sensitive());
    }

    #[test]
    fn expired_token_is_a_non_transient_failure() {
        let mut req = request();
        let err = decorator(AccessToken::new("abc").expiring_on(Utc::now() - Duration::minutes(1)))
            .decorate(&mut req)
            .unwrap_err();
        assert_eq!(err.decorator(), "credential");
        assert!(!err.is_transient());
        assert!(req.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn token_with_control_characters_is_rejected() {
        let mut req = request();
        assert!(decorator(AccessToken::new("abc\ndef"))
            .decorate(&mut req)
            .is_err());
    }

    #[test]
    fn source_failures_propagate_unchanged() {
        #[derive(Debug)]
        struct Busy;
        impl AccessTokenSource for Busy {
            fn access_token(&self) -> Result<AccessToken, DecoratorError> {
                Err(DecoratorError::new(NAME, "token endpoint busy").transient())
            }
        }

        let err = AccessTokenDecorator::new(Arc::new(Busy))
            .decorate(&mut request())
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let rendered = format!("{:?}", AccessToken::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
