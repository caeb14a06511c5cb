//! Client context domain for a redirecting media data service.
//!
//! The caller supplies a logical service URI. [`ContextFactory`] probes it
//! once at construction time to discover the real endpoint, then builds any
//! number of independent client contexts against that endpoint, each wired
//! with the credential and version decorators and with the entity
//! initialization hook.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! The network is reached only through [`Transport`]; concrete decorators live
//! in the `decorators` crate and the HTTP transport in `http-transport`.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ServiceUri`, `ResolvedEndpoint`, `ContextId`, ...) |
//! | [`types`] | Value types (`ServiceVersion`, `Timestamp`) |
//! | [`errors`] | [`ContextError`] and [`Retryability`] |
//! | [`transport`] | Request/response types and the [`Transport`] port |
//! | [`decorator`] | [`RequestDecorator`] and the ordered [`DecoratorChain`] |
//! | [`retry`] | [`RetryPolicy`](retry::RetryPolicy), detection and back-off strategies |
//! | [`resolver`] | [`EndpointResolver`]: the one-shot probe |
//! | [`entity`] | Entity traits, [`OwnerHandle`] and [`EntityInitHook`] |
//! | [`data_context`] | [`DataServiceContext`]: the request/response engine |
//! | [`builder`] | [`ContextBuilder`] and [`MediaDataServiceContext`] |
//! | [`factory`] | [`ContextFactory`] |
//! | [`config`] | [`FactoryConfig`](config::FactoryConfig) |

pub mod builder;
pub mod config;
pub mod data_context;
pub mod decorator;
pub mod entity;
pub mod errors;
pub mod factory;
pub mod identifiers;
pub mod resolver;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use builder::{ContextBuilder, MediaDataServiceContext};
pub use data_context::{ContextOptions, DataServiceContext, EntityState, MergeOption, SaveSummary};
pub use decorator::{DecoratorChain, DecoratorError, RequestDecorator};
pub use entity::{
    Entity, EntityInitHook, MaterializedEntity, OwnerAware, OwnerHandle, ReadingEntityHook,
};
pub use errors::{ContextError, Retryability};
pub use factory::ContextFactory;
pub use identifiers::{ContextId, EntityKey, EntitySetName, ResolvedEndpoint, ServiceUri};
pub use resolver::EndpointResolver;
pub use transport::{
    OutgoingRequest, Transport, TransportError, TransportErrorKind, TransportResponse,
};
pub use types::{ServiceVersion, Timestamp};
