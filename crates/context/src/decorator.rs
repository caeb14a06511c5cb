//! Request decorators and their fixed application order.
//!
//! A decorator mutates an outgoing request to add cross-cutting data. Two
//! slots exist, credential and protocol version, and [`DecoratorChain`] always
//! applies them in that order. Both the resolution probe and every request a
//! built context issues go through the same chain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::OutgoingRequest;

/// A decorator refused to decorate a request (e.g. no usable credential).
///
/// Not transient unless the decorator says so via [`DecoratorError::transient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Decorator '{decorator}' failed: {message}")]
pub struct DecoratorError {
    decorator: String,
    message: String,
    transient: bool,
}

impl DecoratorError {
    /// Creates a non-transient decorator failure.
    pub fn new(decorator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            decorator: decorator.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Marks this failure as safe to retry.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Name of the decorator that failed.
    pub fn decorator(&self) -> &str {
        &self.decorator
    }

    /// Returns `true` if the decorator reported this failure as retriable.
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Mutates an outgoing request.
///
/// Implementations write headers only; they must not change the method, URI
/// or redirect flag.
pub trait RequestDecorator: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Decorates `request` in place.
    fn decorate(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError>;
}

/// The ordered decorator set: credential first, then protocol version.
///
/// If two decorators ever write the same header, the later one wins, so the
/// version decorator's value takes precedence over the credential decorator's.
#[derive(Debug, Clone)]
pub struct DecoratorChain {
    credential: Arc<dyn RequestDecorator>,
    version: Arc<dyn RequestDecorator>,
}

impl DecoratorChain {
    /// Creates the chain from its two slots.
    pub fn new(credential: Arc<dyn RequestDecorator>, version: Arc<dyn RequestDecorator>) -> Self {
        Self {
            credential,
            version,
        }
    }

    /// Iterates the decorators in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RequestDecorator>> {
        [&self.credential, &self.version].into_iter()
    }

    /// Applies every decorator in order, stopping at the first failure.
    pub fn apply(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError> {
        for decorator in self.iter() {
            decorator.decorate(request)?;
            tracing::trace!(decorator = decorator.name(), "request decorated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{HeaderName, HeaderValue, Method};
    use url::Url;

    use super::*;

    #[derive(Debug)]
    struct Writes {
        name: &'static str,
        header: &'static str,
        value: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl RequestDecorator for Writes {
        fn name(&self) -> &str {
            self.name
        }

        fn decorate(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(DecoratorError::new(self.name, "refused"));
            }
            request.set_header(
                HeaderName::from_static(self.header),
                HeaderValue::from_static(self.value),
            );
            Ok(())
        }
    }

    fn request() -> OutgoingRequest {
        OutgoingRequest::new(Method::GET, Url::parse("https://media.example/").unwrap())
    }

    fn writes(
        name: &'static str,
        header: &'static str,
        value: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn RequestDecorator> {
        Arc::new(Writes {
            name,
            header,
            value,
            log: Arc::clone(log),
            fail,
        })
    }

    #[test]
    fn later_decorator_wins_on_header_conflict() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = DecoratorChain::new(
            writes("credential", "x-shared", "from-credential", &log, false),
            writes("version", "x-shared", "from-version", &log, false),
        );
        let mut req = request();
        chain.apply(&mut req).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["credential", "version"]);
        assert_eq!(req.header_str("x-shared"), Some("from-version"));
    }

    #[test]
    fn credential_failure_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = DecoratorChain::new(
            writes("credential", "authorization", "Bearer t", &log, true),
            writes("version", "x-ms-version", "2.19", &log, false),
        );
        let mut req = request();
        let err = chain.apply(&mut req).unwrap_err();
        assert_eq!(err.decorator(), "credential");
        assert!(!err.is_transient());
        assert_eq!(*log.lock().unwrap(), vec!["credential"]);
        assert!(req.headers.is_empty());
    }
}
