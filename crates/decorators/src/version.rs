//! Service-version decorator.

use context::{DecoratorError, OutgoingRequest, RequestDecorator, ServiceVersion};
use http::{HeaderName, HeaderValue};

/// Header carrying the requested REST API version.
pub const SERVICE_VERSION_HEADER: HeaderName = HeaderName::from_static("x-ms-version");

/// Writes `x-ms-version: <major.minor>`.
#[derive(Debug, Clone)]
pub struct ServiceVersionDecorator {
    version: ServiceVersion,
}

impl ServiceVersionDecorator {
    /// Creates a decorator requesting `version`.
    pub fn new(version: ServiceVersion) -> Self {
        Self { version }
    }
}

impl RequestDecorator for ServiceVersionDecorator {
    fn name(&self) -> &str {
        "version"
    }

    fn decorate(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError> {
        let value = HeaderValue::from_str(&self.version.to_string())
            .map_err(|e| DecoratorError::new(self.name(), e.to_string()))?;
        request.set_header(SERVICE_VERSION_HEADER, value);
        Ok(())
    }
}
