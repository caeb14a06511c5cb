//! One-shot discovery of the real service endpoint.
//!
//! The caller-supplied URI is a logical entry point. The resolver probes it
//! once, with redirect following disabled, and reads the real endpoint from the
//! response: the `Location` of a `301 Moved Permanently`, or the final request
//! URI of a `200 OK`. Any other status is a fatal protocol error.
//!
//! Only one redirect hop is taken. The redirect target is returned as-is and
//! never probed, so a target that would itself redirect is not followed.

use std::sync::Arc;

use http::header::LOCATION;
use http::{Method, StatusCode};
use tracing::{debug, info, instrument};
use url::Url;

use crate::retry::RetryPolicy;
use crate::{
    ContextError, DecoratorChain, OutgoingRequest, ResolvedEndpoint, ServiceUri, Transport,
    TransportResponse,
};

/// Probes a logical service URI and yields the canonical endpoint.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl EndpointResolver {
    /// Creates a resolver sending its probe through `transport` under `retry`.
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Resolves `service` to its real endpoint. Blocks for the full duration
    /// of the probe, including every retry.
    ///
    /// Each attempt builds a fresh probe, applies `decorators` (credential,
    /// then version) and sends it. Only failures the retry policy classifies
    /// as transient are retried.
    ///
    /// # Errors
    ///
    /// - [`ContextError::Connectivity`] once transient failures exhaust the policy.
    /// - [`ContextError::MalformedRedirect`] for a `301` without a usable `Location`.
    /// - [`ContextError::UnexpectedStatus`] for any status other than `200` or `301`.
    /// - [`ContextError::Decorator`] when a decorator fails non-transiently.
    #[instrument(skip_all, fields(service = %service))]
    pub fn resolve(
        &self,
        service: &ServiceUri,
        decorators: &DecoratorChain,
    ) -> Result<ResolvedEndpoint, ContextError> {
        let endpoint = self.retry.execute(|| {
            let mut probe = OutgoingRequest::new(Method::GET, service.as_url().clone());
            probe.follow_redirects = false;
            decorators.apply(&mut probe)?;
            debug!("sending endpoint probe");
            let response = self.transport.send(probe)?;
            endpoint_from_response(service, &response)
        })?;
        info!(endpoint = %endpoint, "service endpoint resolved");
        Ok(endpoint)
    }
}

/// Interprets a probe response.
///
/// The `Location` of a `301` must be an absolute URI.
pub fn endpoint_from_response(
    service: &ServiceUri,
    response: &TransportResponse,
) -> Result<ResolvedEndpoint, ContextError> {
    match response.status {
        StatusCode::MOVED_PERMANENTLY => {
            let malformed = |location: Option<String>, reason: String| {
                ContextError::MalformedRedirect {
                    uri: service.to_string(),
                    location,
                    reason,
                }
            };

            let raw = response
                .headers
                .get(LOCATION)
                .ok_or_else(|| malformed(None, "missing Location header".to_string()))?;
            let location = raw.to_str().map_err(|_| {
                malformed(
                    Some(String::from_utf8_lossy(raw.as_bytes()).into_owned()),
                    "Location header is not visible ASCII".to_string(),
                )
            })?;
            if location.trim().is_empty() {
                return Err(malformed(
                    Some(location.to_string()),
                    "empty Location header".to_string(),
                ));
            }

            let target = Url::parse(location.trim())
                .map_err(|e| malformed(Some(location.to_string()), e.to_string()))?;
            debug!(location, target = %target, "probe redirected");
            ResolvedEndpoint::from_url(target)
                .map_err(|e| malformed(Some(location.to_string()), e.to_string()))
        }
        StatusCode::OK => ResolvedEndpoint::from_url(response.final_uri.clone()),
        status => Err(ContextError::UnexpectedStatus {
            status,
            uri: service.to_string(),
        }),
    }
}
