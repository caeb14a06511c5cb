//! The client context engine.
//!
//! [`DataServiceContext`] issues data-service requests against one base URI.
//! Every request carries the protocol-version headers, then passes through the
//! registered sending-request decorators in registration order. Every entity
//! materialized from a query response passes through the registered
//! reading-entity hooks. Writes are staged in a change tracker and submitted
//! by [`DataServiceContext::save_changes`].
//!
//! Every request runs under the context's [`RetryPolicy`]: each attempt is
//! decorated afresh, and transient failures surface as
//! [`ContextError::Connectivity`] only once the policy gives up.
//!
//! Queries address a single entity set, payloads are JSON shaped as
//! `{"value": [...]}`, and each staged change is one request.

use std::fmt;
use std::sync::Arc;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::retry::RetryPolicy;
use crate::{
    ContextError, ContextId, Entity, EntityKey, EntitySetName, MaterializedEntity,
    OutgoingRequest, ReadingEntityHook, RequestDecorator, ResolvedEndpoint, Transport,
    TransportResponse,
};

const DATA_SERVICE_VERSION: HeaderName = HeaderName::from_static("dataserviceversion");
const MAX_DATA_SERVICE_VERSION: HeaderName = HeaderName::from_static("maxdataserviceversion");
const PROTOCOL_VERSION: &str = "3.0";
const JSON: &str = "application/json";
const KEY_PROPERTY: &str = "Id";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How query results interact with entities the context already tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOption {
    /// Already-tracked entities keep their local values; only new ones are added.
    AppendOnly,
    /// Server values replace local values and discard pending changes.
    OverwriteChanges,
    /// Server values refresh unchanged entities; entities with pending local
    /// changes keep their local values.
    #[default]
    PreserveChanges,
    /// Results are not tracked at all.
    NoTracking,
}

/// Behavioural flags of a client context.
///
/// [`Default`] yields the flags every factory-built context uses;
/// [`ContextOptions::strict`] yields the bare engine's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Payload properties the entity type does not know are ignored instead
    /// of failing materialization.
    pub ignore_missing_properties: bool,
    /// A `404 Not Found` answering a delete is treated as success.
    pub ignore_resource_not_found: bool,
    /// Interaction between query results and tracked entities.
    pub merge_option: MergeOption,
}

impl ContextOptions {
    /// Flags of a freshly constructed engine: unknown properties fail,
    /// missing resources fail, tracked entities are append-only.
    pub fn strict() -> Self {
        Self {
            ignore_missing_properties: false,
            ignore_resource_not_found: false,
            merge_option: MergeOption::AppendOnly,
        }
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            ignore_missing_properties: true,
            ignore_resource_not_found: true,
            merge_option: MergeOption::PreserveChanges,
        }
    }
}

// ---------------------------------------------------------------------------
// Change tracking
// ---------------------------------------------------------------------------

/// Tracking state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Matches the last known server state.
    Unchanged,
    /// Staged for creation.
    Added,
    /// Staged for update.
    Modified,
    /// Staged for deletion.
    Deleted,
}

/// Counts of changes submitted by one [`DataServiceContext::save_changes`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Entities created.
    pub created: usize,
    /// Entities updated.
    pub updated: usize,
    /// Entities deleted (including deletes answered by an ignored `404`).
    pub deleted: usize,
}

#[derive(Debug, Clone)]
struct TrackedEntity {
    entity_set: EntitySetName,
    key: Option<EntityKey>,
    state: EntityState,
    snapshot: Value,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A request/response engine bound to one service endpoint.
pub struct DataServiceContext {
    id: ContextId,
    base_uri: ResolvedEndpoint,
    options: ContextOptions,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    sending_request: Vec<Arc<dyn RequestDecorator>>,
    reading_entity: Vec<ReadingEntityHook>,
    tracked: Vec<TrackedEntity>,
}

impl DataServiceContext {
    /// Creates a context with [`ContextOptions::strict`], no decorators and no
    /// hooks. Requests are retried under `retry`.
    pub fn new(
        base_uri: ResolvedEndpoint,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: ContextId::new_random(),
            base_uri,
            options: ContextOptions::strict(),
            transport,
            retry,
            sending_request: Vec::new(),
            reading_entity: Vec::new(),
            tracked: Vec::new(),
        }
    }

    /// Identifier of this context, for log correlation.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The endpoint every request is issued against.
    pub fn base_uri(&self) -> &ResolvedEndpoint {
        &self.base_uri
    }

    /// Current behavioural flags.
    pub fn options(&self) -> ContextOptions {
        self.options
    }

    /// Replaces the behavioural flags.
    pub fn set_options(&mut self, options: ContextOptions) {
        self.options = options;
    }

    /// Registers a decorator run on every outgoing request, after those
    /// already registered.
    pub fn add_sending_request(&mut self, decorator: Arc<dyn RequestDecorator>) {
        self.sending_request.push(decorator);
    }

    /// Names of the registered decorators, in application order.
    pub fn sending_request_names(&self) -> Vec<&str> {
        self.sending_request.iter().map(|d| d.name()).collect()
    }

    /// Registers a hook run on every materialized entity.
    pub fn add_reading_entity(&mut self, hook: ReadingEntityHook) {
        self.reading_entity.push(hook);
    }

    /// Tracking state of the entity with `key` in `entity_set`, if tracked.
    pub fn entity_state(&self, entity_set: &EntitySetName, key: &EntityKey) -> Option<EntityState> {
        self.position(entity_set, key).map(|i| self.tracked[i].state)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Retrieves every entity in `entity_set`.
    ///
    /// # Errors
    ///
    /// - Transport and decorator failures.
    /// - [`ContextError::RequestFailed`] for any status other than `200 OK`.
    /// - [`ContextError::Serialization`] for a malformed payload.
    /// - [`ContextError::UnknownProperty`] when the payload carries a property
    ///   `T` does not know and unknown properties are not ignored.
    pub fn query<T: Entity>(&mut self, entity_set: &EntitySetName) -> Result<Vec<T>, ContextError> {
        let uri = self.base_uri.entity_set_url(entity_set)?;
        let response = self.send(OutgoingRequest::new(Method::GET, uri.clone()))?;
        if response.status != StatusCode::OK {
            return Err(ContextError::RequestFailed {
                method: Method::GET,
                uri: uri.to_string(),
                status: response.status,
            });
        }

        let records = match serde_json::from_slice::<Value>(&response.body)? {
            Value::Object(mut payload) => match payload.remove("value") {
                Some(Value::Array(records)) => records,
                _ => return Err(missing_value_array()),
            },
            _ => return Err(missing_value_array()),
        };

        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let (view, from_server) = match self.preserved_snapshot(entity_set, &record) {
                Some(local) => (local, false),
                None => (record.clone(), true),
            };
            let mut entity: T = self.materialize(entity_set, view)?;
            if from_server {
                self.track_server_record(entity_set, record);
            }
            for hook in &self.reading_entity {
                hook(&mut entity as &mut dyn MaterializedEntity);
            }
            entities.push(entity);
        }
        debug!(
            context_id = %self.id,
            entity_set = %entity_set,
            count = entities.len(),
            "query materialized"
        );
        Ok(entities)
    }

    /// The local snapshot to materialize instead of `record`, when the merge
    /// option keeps local values for an already-tracked entity.
    fn preserved_snapshot(&self, entity_set: &EntitySetName, record: &Value) -> Option<Value> {
        let merge = self.options.merge_option;
        if merge == MergeOption::NoTracking {
            return None;
        }
        let key = record_key(record)?;
        let entry = &self.tracked[self.position(entity_set, &key)?];
        let keep_local = match merge {
            MergeOption::AppendOnly => true,
            MergeOption::PreserveChanges => entry.state != EntityState::Unchanged,
            MergeOption::OverwriteChanges | MergeOption::NoTracking => false,
        };
        if keep_local {
            debug!(entity_set = %entity_set, key = %key, state = ?entry.state, "keeping local values");
        }
        keep_local.then(|| entry.snapshot.clone())
    }

    /// Records `record` as the entity's server state.
    fn track_server_record(&mut self, entity_set: &EntitySetName, record: Value) {
        if self.options.merge_option == MergeOption::NoTracking {
            return;
        }
        let Some(key) = record_key(&record) else {
            return;
        };
        match self.position(entity_set, &key) {
            Some(index) => {
                let entry = &mut self.tracked[index];
                entry.snapshot = record;
                entry.state = EntityState::Unchanged;
            }
            None => self.tracked.push(TrackedEntity {
                entity_set: entity_set.clone(),
                key: Some(key),
                state: EntityState::Unchanged,
                snapshot: record,
            }),
        }
    }

    fn materialize<T: Entity>(
        &self,
        entity_set: &EntitySetName,
        record: Value,
    ) -> Result<T, ContextError> {
        if self.options.ignore_missing_properties {
            return Ok(serde_json::from_value(record)?);
        }

        let mut unknown = Vec::new();
        let entity: T = serde_ignored::deserialize(record, |path| {
            if let serde_ignored::Path::Map { parent, key } = path {
                if matches!(parent, serde_ignored::Path::Root) && !is_annotation(&key) {
                    unknown.push(key);
                }
            }
        })?;
        if let Some(property) = unknown.into_iter().next() {
            return Err(ContextError::UnknownProperty {
                entity_set: entity_set.to_string(),
                property,
            });
        }
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Staged writes
    // -----------------------------------------------------------------------

    /// Stages `entity` for creation in `entity_set`.
    ///
    /// # Errors
    ///
    /// [`ContextError::InvalidOperation`] if an entity with the same key is
    /// already tracked.
    pub fn create<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        let key = entity.key();
        if let Some(key) = &key {
            if self.position(entity_set, key).is_some() {
                return Err(ContextError::InvalidOperation {
                    message: format!("entity '{key}' in '{entity_set}' is already tracked"),
                });
            }
        }
        self.tracked.push(TrackedEntity {
            entity_set: entity_set.clone(),
            key,
            state: EntityState::Added,
            snapshot: serde_json::to_value(entity)?,
        });
        Ok(())
    }

    /// Stages the current values of `entity` for update.
    ///
    /// # Errors
    ///
    /// [`ContextError::InvalidOperation`] if `entity` has no key or is staged
    /// for deletion.
    pub fn update<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        let key = require_key(entity_set, entity.key())?;
        let snapshot = serde_json::to_value(entity)?;
        match self.position(entity_set, &key) {
            Some(index) => {
                let entry = &mut self.tracked[index];
                match entry.state {
                    EntityState::Deleted => {
                        return Err(ContextError::InvalidOperation {
                            message: format!("entity '{key}' in '{entity_set}' is staged for deletion"),
                        });
                    }
                    EntityState::Added => entry.snapshot = snapshot,
                    EntityState::Unchanged | EntityState::Modified => {
                        entry.snapshot = snapshot;
                        entry.state = EntityState::Modified;
                    }
                }
            }
            None => self.tracked.push(TrackedEntity {
                entity_set: entity_set.clone(),
                key: Some(key),
                state: EntityState::Modified,
                snapshot,
            }),
        }
        Ok(())
    }

    /// Stages `entity` for deletion. Deleting an entity that was only staged
    /// for creation simply forgets it.
    ///
    /// # Errors
    ///
    /// [`ContextError::InvalidOperation`] if `entity` has no key.
    pub fn delete<T: Entity>(
        &mut self,
        entity_set: &EntitySetName,
        entity: &T,
    ) -> Result<(), ContextError> {
        let key = require_key(entity_set, entity.key())?;
        match self.position(entity_set, &key) {
            Some(index) if self.tracked[index].state == EntityState::Added => {
                self.tracked.remove(index);
            }
            Some(index) => self.tracked[index].state = EntityState::Deleted,
            None => self.tracked.push(TrackedEntity {
                entity_set: entity_set.clone(),
                key: Some(key),
                state: EntityState::Deleted,
                snapshot: serde_json::to_value(entity)?,
            }),
        }
        Ok(())
    }

    /// Submits every staged change, one request per change, in staging order.
    ///
    /// Stops at the first failure; changes submitted before it stay committed.
    ///
    /// # Errors
    ///
    /// Transport and decorator failures, and [`ContextError::RequestFailed`]
    /// for a non-success status (except a `404` answering a delete when
    /// [`ContextOptions::ignore_resource_not_found`] is set).
    pub fn save_changes(&mut self) -> Result<SaveSummary, ContextError> {
        let mut summary = SaveSummary::default();
        let mut index = 0;
        while index < self.tracked.len() {
            let entry = self.tracked[index].clone();
            match entry.state {
                EntityState::Unchanged => index += 1,
                EntityState::Added => {
                    let uri = self.base_uri.entity_set_url(&entry.entity_set)?;
                    let response = self.send_json(Method::POST, uri.clone(), &entry.snapshot)?;
                    ensure_success(Method::POST, &uri, response.status)?;
                    let saved = match serde_json::from_slice::<Value>(&response.body) {
                        Ok(saved @ Value::Object(_)) => saved,
                        _ => entry.snapshot,
                    };
                    let tracked = &mut self.tracked[index];
                    if let Some(key) = record_key(&saved) {
                        tracked.key = Some(key);
                    }
                    tracked.snapshot = saved;
                    tracked.state = EntityState::Unchanged;
                    summary.created += 1;
                    index += 1;
                }
                EntityState::Modified => {
                    let key = require_key(&entry.entity_set, entry.key.clone())?;
                    let uri = self.base_uri.entity_url(&entry.entity_set, &key)?;
                    let response = self.send_json(Method::PATCH, uri.clone(), &entry.snapshot)?;
                    ensure_success(Method::PATCH, &uri, response.status)?;
                    self.tracked[index].state = EntityState::Unchanged;
                    summary.updated += 1;
                    index += 1;
                }
                EntityState::Deleted => {
                    let key = require_key(&entry.entity_set, entry.key.clone())?;
                    let uri = self.base_uri.entity_url(&entry.entity_set, &key)?;
                    let response = self.send(OutgoingRequest::new(Method::DELETE, uri.clone()))?;
                    if response.status == StatusCode::NOT_FOUND
                        && self.options.ignore_resource_not_found
                    {
                        debug!(context_id = %self.id, uri = %uri, "delete target already gone");
                    } else {
                        ensure_success(Method::DELETE, &uri, response.status)?;
                    }
                    self.tracked.remove(index);
                    summary.deleted += 1;
                }
            }
        }
        debug!(context_id = %self.id, ?summary, "changes saved");
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, ContextError> {
        debug!(
            context_id = %self.id,
            method = %request.method,
            uri = %request.uri,
            "sending request"
        );
        self.retry.execute(|| {
            let mut attempt = request.clone();
            let version = HeaderValue::from_static(PROTOCOL_VERSION);
            attempt.set_header(DATA_SERVICE_VERSION, version.clone());
            attempt.set_header(MAX_DATA_SERVICE_VERSION, version);
            attempt.set_header(ACCEPT, HeaderValue::from_static(JSON));
            for decorator in &self.sending_request {
                decorator.decorate(&mut attempt)?;
            }
            Ok(self.transport.send(attempt)?)
        })
    }

    fn send_json(
        &self,
        method: Method,
        uri: Url,
        body: &Value,
    ) -> Result<TransportResponse, ContextError> {
        let mut request = OutgoingRequest::new(method, uri);
        request.set_header(CONTENT_TYPE, HeaderValue::from_static(JSON));
        request.body = Some(serde_json::to_vec(body)?);
        self.send(request)
    }

    fn position(&self, entity_set: &EntitySetName, key: &EntityKey) -> Option<usize> {
        self.tracked
            .iter()
            .position(|e| &e.entity_set == entity_set && e.key.as_ref() == Some(key))
    }
}

impl fmt::Debug for DataServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataServiceContext")
            .field("id", &self.id)
            .field("base_uri", &self.base_uri)
            .field("options", &self.options)
            .field("sending_request", &self.sending_request_names())
            .field("reading_entity_hooks", &self.reading_entity.len())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}

fn record_key(record: &Value) -> Option<EntityKey> {
    record
        .get(KEY_PROPERTY)
        .and_then(Value::as_str)
        .and_then(EntityKey::new)
}

fn require_key(
    entity_set: &EntitySetName,
    key: Option<EntityKey>,
) -> Result<EntityKey, ContextError> {
    key.ok_or_else(|| ContextError::InvalidOperation {
        message: format!("entity in '{entity_set}' has no key"),
    })
}

fn ensure_success(method: Method, uri: &Url, status: StatusCode) -> Result<(), ContextError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ContextError::RequestFailed {
            method,
            uri: uri.to_string(),
            status,
        })
    }
}

fn is_annotation(name: &str) -> bool {
    name.starts_with("odata.") || name.starts_with("__") || name.contains('@')
}

fn missing_value_array() -> ContextError {
    ContextError::Serialization {
        message: "response payload has no 'value' array".to_string(),
    }
}
