//! The context factory: resolve once, build many.

use std::sync::Arc;

use tracing::info;

use crate::config::FactoryConfig;
use crate::retry::RetryPolicy;
use crate::{
    ContextBuilder, ContextError, ContextOptions, DecoratorChain, EndpointResolver,
    MediaDataServiceContext, OwnerHandle, ResolvedEndpoint, ServiceUri, Transport,
};

/// Creates client contexts connected to the real service endpoint.
///
/// Construction probes the logical service URI (blocking, under the retry
/// policy) and caches the resolved endpoint. Construction either succeeds with
/// the endpoint set or fails with no factory produced.
///
/// The factory is immutable after construction and may be shared across
/// threads; concurrent [`ContextFactory::create_context`] calls are
/// independent.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    builder: ContextBuilder,
}

impl ContextFactory {
    /// Resolves `service` and prepares to build contexts with the default
    /// [`ContextOptions`].
    ///
    /// # Errors
    ///
    /// Any resolution failure; see [`EndpointResolver::resolve`].
    pub fn new(
        service: &ServiceUri,
        decorators: DecoratorChain,
        owner: OwnerHandle,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Result<Self, ContextError> {
        Self::with_options(
            service,
            decorators,
            owner,
            transport,
            retry,
            ContextOptions::default(),
        )
    }

    /// Like [`ContextFactory::new`] with explicit context options.
    ///
    /// # Errors
    ///
    /// Any resolution failure; see [`EndpointResolver::resolve`].
    pub fn with_options(
        service: &ServiceUri,
        decorators: DecoratorChain,
        owner: OwnerHandle,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        options: ContextOptions,
    ) -> Result<Self, ContextError> {
        let resolver = EndpointResolver::new(Arc::clone(&transport), retry.clone());
        let endpoint = resolver.resolve(service, &decorators)?;
        info!(service = %service, endpoint = %endpoint, "context factory ready");
        Ok(Self {
            builder: ContextBuilder::new(endpoint, decorators, owner, transport, retry)
                .with_options(options),
        })
    }

    /// Validates `config`, then constructs the factory with the retry policy
    /// and context options it describes.
    ///
    /// # Errors
    ///
    /// [`ContextError::Configuration`] for an invalid config, otherwise any
    /// resolution failure.
    pub fn from_config(
        config: &FactoryConfig,
        decorators: DecoratorChain,
        owner: OwnerHandle,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ContextError> {
        let service = config.validate()?;
        Self::with_options(
            &service,
            decorators,
            owner,
            transport,
            RetryPolicy::from_settings(&config.retry),
            config.context,
        )
    }

    /// The endpoint resolved at construction.
    pub fn endpoint(&self) -> &ResolvedEndpoint {
        self.builder.endpoint()
    }

    /// Creates a new, independent, fully wired client context.
    pub fn create_context(&self) -> MediaDataServiceContext {
        self.builder.build()
    }
}
