//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! the caller-supplied [`ServiceUri`] with the [`ResolvedEndpoint`] discovered by
//! the probe, even though both are URLs under the hood.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::ContextError;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for Url-wrapped newtypes.
// Generates: struct, parse(), from_url(), as_url(), as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! uri_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Url);

        impl $name {
            /// Parses an absolute URI.
            ///
            /// # Errors
            ///
            /// Returns [`ContextError::InvalidUri`] if `value` is not an absolute
            /// `http` or `https` URI.
            pub fn parse(value: &str) -> Result<Self, ContextError> {
                let url = Url::parse(value).map_err(|e| ContextError::InvalidUri {
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
                Self::from_url(url)
            }

            /// Wraps an already-parsed URL.
            ///
            /// # Errors
            ///
            /// Returns [`ContextError::InvalidUri`] for schemes other than
            /// `http` and `https`.
            pub fn from_url(url: Url) -> Result<Self, ContextError> {
                match url.scheme() {
                    "http" | "https" => Ok(Self(url)),
                    other => Err(ContextError::InvalidUri {
                        value: url.to_string(),
                        reason: format!("unsupported scheme '{other}'"),
                    }),
                }
            }

            /// Returns the underlying [`Url`].
            pub fn as_url(&self) -> &Url {
                &self.0
            }

            /// Returns the URI as a string slice.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: Url-backed
// ---------------------------------------------------------------------------

uri_id! {
    /// The logical entry point supplied by the caller.
    ///
    /// Not guaranteed to be the real service address; the factory probes it
    /// once to discover the [`ResolvedEndpoint`].
    ServiceUri
}

uri_id! {
    /// The authoritative service location discovered by the probe.
    ///
    /// Computed exactly once per factory and shared, read-only, by every
    /// context the factory builds.
    ResolvedEndpoint
}

impl ResolvedEndpoint {
    /// Returns the URL of `entity_set` under this endpoint.
    ///
    /// The set name is appended as a single path segment, so an endpoint of
    /// `https://host/api/` and one of `https://host/api` both yield
    /// `https://host/api/Assets`.
    pub fn entity_set_url(&self, entity_set: &EntitySetName) -> Result<Url, ContextError> {
        let mut url = self.0.clone();
        url.path_segments_mut()
            .map_err(|()| ContextError::InvalidUri {
                value: self.0.to_string(),
                reason: "endpoint cannot be a base URI".to_string(),
            })?
            .pop_if_empty()
            .push(entity_set.as_str());
        Ok(url)
    }

    /// Returns the URL addressing a single entity: `<set>('<key>')`.
    pub fn entity_url(
        &self,
        entity_set: &EntitySetName,
        key: &EntityKey,
    ) -> Result<Url, ContextError> {
        let escaped = key.as_str().replace('\'', "''");
        let segment = EntitySetName(format!("{}('{}')", entity_set.as_str(), escaped));
        self.entity_set_url(&segment)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one client context built by the factory.
///
/// Generated fresh for every `create_context` call; attached to spans so all
/// requests from a single context can be correlated in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generates a new random context identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Names a collection exposed by the data service (e.g. `"Assets"`, `"Jobs"`).
    EntitySetName
}

string_id! {
    /// The service-assigned key of one entity (the payload's `Id` property).
    EntityKey
}
