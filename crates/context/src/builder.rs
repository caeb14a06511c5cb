//! Assembly of fully wired client contexts.

use std::sync::Arc;

use tracing::info;

use crate::retry::RetryPolicy;
use crate::{
    ContextError, ContextId, ContextOptions, DataServiceContext, DecoratorChain, Entity,
    EntityInitHook, EntityKey, EntitySetName, EntityState, OwnerHandle, ResolvedEndpoint,
    SaveSummary, Transport,
};

/// Builds independent client contexts against one resolved endpoint.
///
/// Every [`ContextBuilder::build`] call produces a fresh engine: configured
/// with the builder's [`ContextOptions`], decorated with the credential then
/// version decorator, retrying under the factory's [`RetryPolicy`], and with
/// the [`EntityInitHook`] registered. Built contexts share nothing mutable
/// with each other.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    endpoint: ResolvedEndpoint,
    decorators: DecoratorChain,
    owner: OwnerHandle,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    options: ContextOptions,
}

impl ContextBuilder {
    /// Creates a builder using the default [`ContextOptions`].
    pub fn new(
        endpoint: ResolvedEndpoint,
        decorators: DecoratorChain,
        owner: OwnerHandle,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            decorators,
            owner,
            transport,
            retry,
            options: ContextOptions::default(),
        }
    }

    /// Replaces the options applied to every built context.
    #[must_use]
    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    /// The endpoint every built context targets.
    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    /// Builds one context.
    pub fn build(&self) -> MediaDataServiceContext {
        let mut context = DataServiceContext::new(
            self.endpoint.clone(),
            Arc::clone(&self.transport),
            self.retry.clone(),
        );
        context.set_options(self.options);

        for decorator in self.decorators.iter() {
            context.add_sending_request(Arc::clone(decorator));
        }

        context.add_reading_entity(EntityInitHook::new(self.owner.clone()).into_callback());

        info!(
            context_id = %context.id(),
            endpoint = %self.endpoint,
            "client context created"
        );
        MediaDataServiceContext { inner: context }
    }
}

/// A client context seen through its capability surface only.
///
/// Wraps a [`DataServiceContext`]; callers can read and write entities but
/// cannot re-register decorators or hooks.
#[derive(Debug)]
pub struct MediaDataServiceContext {
    inner: DataServiceContext,
}

impl MediaDataServiceContext {
    /// Identifier of this context.
    pub fn id(&self) -> ContextId {
        self.inner.id()
    }

    /// The endpoint this context targets.
    pub fn endpoint(&self) -> &ResolvedEndpoint {
        self.inner.base_uri()
    }

    /// The behavioural flags this context was built with.
    pub fn options(&self) -> ContextOptions {
        self.inner.options()
    }

    /// See [`DataServiceContext::query`].
    pub fn query<T: Entity>(&mut self, entity_set: &EntitySetName) -> Result<Vec<T>, ContextError> {
        self.inner.query(entity_set)
    }

    /// See [`DataServiceContext::create`].
    pub fn create<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        self.inner.create(entity_set, entity)
    }

    /// See [`DataServiceContext::update`].
    pub fn update<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        self.inner.update(entity_set, entity)
    }

    /// See [`DataServiceContext::delete`].
    pub fn delete<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        self.inner.delete(entity_set, entity)
    }

    /// See [`DataServiceContext::save_changes`].
    pub fn save_changes(&mut self) -> Result<SaveSummary, ContextError> {
        self.inner.save_changes()
    }

    /// See [`DataServiceContext::entity_state`].
    pub fn entity_state(&self, entity_set: &EntitySetName, key: &EntityKey) -> Option<EntityState> {
        self.inner.entity_state(entity_set, key)
    }
}
