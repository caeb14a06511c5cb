//! Request decorators for the media data service.
//!
//! Implements the [`context::RequestDecorator`] port twice:
//!
//! - [`AccessTokenDecorator`] writes `Authorization: Bearer <token>` from an
//!   [`AccessTokenSource`].
//! - [`ServiceVersionDecorator`] writes `x-ms-version: <major.minor>`.
//!
//! [`media_services_chain`] assembles both in the order the factory expects.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Token acquisition and refresh are out of scope; a
//! source hands out whatever token it holds and the decorator refuses tokens
//! that have already expired.

mod credential;
mod version;

use std::sync::Arc;

use context::{DecoratorChain, ServiceVersion};

pub use credential::{AccessToken, AccessTokenDecorator, AccessTokenSource, StaticTokenSource};
pub use version::{ServiceVersionDecorator, SERVICE_VERSION_HEADER};

/// Builds the standard chain: access token first, then service version.
pub fn media_services_chain(
    tokens: Arc<dyn AccessTokenSource>,
    version: ServiceVersion,
) -> DecoratorChain {
    DecoratorChain::new(
        Arc::new(AccessTokenDecorator::new(tokens)),
        Arc::new(ServiceVersionDecorator::new(version)),
    )
}
