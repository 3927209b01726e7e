//! Test utilities shared across crate-level unit tests.

#[cfg(not(target_arch = "wasm32"))]
pub mod http;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::firestore::api::Firestore;
use crate::firestore::error::{FirestoreError, FirestoreResult};
use crate::firestore::model::DatabaseId;
use crate::firestore::remote::datastore::Datastore;

#[cfg(not(target_arch = "wasm32"))]
pub use http::start_mock_server;

/// One call observed by [`RecordingDatastore`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

/// In-process `Datastore` that records requests and replays scripted
/// responses in FIFO order. An empty script answers `{}`.
#[derive(Default)]
pub struct RecordingDatastore {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<FirestoreResult<JsonValue>>>,
}

impl RecordingDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: JsonValue) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: FirestoreError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Datastore for RecordingDatastore {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<JsonValue>,
    ) -> FirestoreResult<JsonValue> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Store for project `demo-project` backed by `datastore`.
pub fn firestore_with(datastore: Arc<RecordingDatastore>) -> Firestore {
    Firestore::new(DatabaseId::default("demo-project"), datastore)
}
