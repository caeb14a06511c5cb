//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use context::retry::{FixedInterval, RetryPolicy, Sleeper, WebTransientErrorDetection};
use context::{
    DecoratorChain, DecoratorError, Entity, EntityKey, MaterializedEntity, OutgoingRequest,
    OwnerAware, OwnerHandle, RequestDecorator, Transport, TransportError, TransportErrorKind,
    TransportResponse,
};
use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

pub const LOGICAL: &str = "https://media.example/";
pub const RESOLVED: &str = "https://wamsbay1.example/api/";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Returns queued outcomes in order and records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<OutgoingRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<TransportResponse, TransportError>) -> &Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn respond(&self, response: TransportResponse) -> &Self {
        self.push(Ok(response))
    }

    pub fn fail(&self, kind: TransportErrorKind) -> &Self {
        self.push(Err(TransportError::new(kind, "scripted failure")))
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::new(
                    TransportErrorKind::Other,
                    "no scripted response left",
                ))
            })
    }
}

pub fn response(status: StatusCode, final_uri: &str) -> TransportResponse {
    TransportResponse {
        status,
        headers: HeaderMap::new(),
        final_uri: Url::parse(final_uri).unwrap(),
        body: Vec::new(),
    }
}

pub fn redirect(location: &str) -> TransportResponse {
    let mut moved = response(StatusCode::MOVED_PERMANENTLY, LOGICAL);
    moved
        .headers
        .insert(LOCATION, HeaderValue::from_str(location).unwrap());
    moved
}

pub fn json(status: StatusCode, final_uri: &str, body: serde_json::Value) -> TransportResponse {
    let mut response = response(status, final_uri);
    response.body = serde_json::to_vec(&body).unwrap();
    response
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Writes one header and records its name in a shared log.
#[derive(Debug)]
pub struct RecordingDecorator {
    name: &'static str,
    header: HeaderName,
    value: HeaderValue,
    log: CallLog,
    failure: Option<DecoratorError>,
}

impl RequestDecorator for RecordingDecorator {
    fn name(&self) -> &str {
        self.name
    }

    fn decorate(&self, request: &mut OutgoingRequest) -> Result<(), DecoratorError> {
        self.log.lock().unwrap().push(self.name.to_string());
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        request.set_header(self.header.clone(), self.value.clone());
        Ok(())
    }
}

pub fn recording_chain(log: &CallLog) -> DecoratorChain {
    DecoratorChain::new(
        Arc::new(RecordingDecorator {
            name: "credential",
            header: http::header::AUTHORIZATION,
            value: HeaderValue::from_static("Bearer test-token"),
            log: Arc::clone(log),
            failure: None,
        }),
        Arc::new(RecordingDecorator {
            name: "version",
            header: HeaderName::from_static("x-ms-version"),
            value: HeaderValue::from_static("2.19"),
            log: Arc::clone(log),
            failure: None,
        }),
    )
}

pub fn failing_credential_chain(log: &CallLog, failure: DecoratorError) -> DecoratorChain {
    DecoratorChain::new(
        Arc::new(RecordingDecorator {
            name: "credential",
            header: http::header::AUTHORIZATION,
            value: HeaderValue::from_static("Bearer test-token"),
            log: Arc::clone(log),
            failure: Some(failure),
        }),
        Arc::new(RecordingDecorator {
            name: "version",
            header: HeaderName::from_static("x-ms-version"),
            value: HeaderValue::from_static("2.19"),
            log: Arc::clone(log),
            failure: None,
        }),
    )
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// A policy allowing `retries` retries 10ms apart, recorded instead of slept.
pub fn retry_policy(retries: u32) -> (RetryPolicy, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let policy = RetryPolicy::new(
        Arc::new(WebTransientErrorDetection),
        Arc::new(FixedInterval::new(retries, Duration::from_millis(10))),
    )
    .with_sleeper(sleeper.clone());
    (policy, sleeper)
}

// ---------------------------------------------------------------------------
// Owner and entities
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MediaAccount {
    pub name: String,
}

pub fn account() -> Arc<MediaAccount> {
    Arc::new(MediaAccount {
        name: "contoso".to_string(),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(skip)]
    pub owner: OwnerHandle,
    #[serde(skip)]
    pub owner_init_calls: u32,
}

impl Asset {
    pub fn new(id: Option<&str>, name: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn account(&self) -> Option<Arc<MediaAccount>> {
        self.owner.upgrade::<MediaAccount>()
    }
}

impl OwnerAware for Asset {
    fn init_with_owner(&mut self, owner: &OwnerHandle) {
        self.owner = owner.clone();
        self.owner_init_calls += 1;
    }
}

impl MaterializedEntity for Asset {
    fn owner_aware(&mut self) -> Option<&mut dyn OwnerAware> {
        Some(self)
    }
}

impl Entity for Asset {
    fn key(&self) -> Option<EntityKey> {
        self.id.as_deref().and_then(EntityKey::new)
    }
}

/// An entity without the owner capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Path")]
    pub path: String,
}

impl MaterializedEntity for Locator {}

impl Entity for Locator {
    fn key(&self) -> Option<EntityKey> {
        EntityKey::new(self.id.as_str())
    }
}
