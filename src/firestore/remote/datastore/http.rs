use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::firestore::error::{FirestoreErrorCode, FirestoreResult};
use crate::firestore::model::DatabaseId;
use crate::firestore::remote::connection::{Connection, ConnectionBuilder, RequestContext};

use super::{Datastore, NoopTokenProvider, TokenProviderArc};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// [`Datastore`] backed by the Firestore REST API.
///
/// Requests are sent once; failures are returned to the caller unchanged. An
/// `Unauthenticated` response invalidates the cached token so the next request
/// fetches a fresh one.
#[derive(Clone)]
pub struct HttpDatastore {
    connection: Connection,
    auth_provider: TokenProviderArc,
    request_timeout: Duration,
}

#[derive(Clone)]
pub struct HttpDatastoreBuilder {
    connection_builder: ConnectionBuilder,
    auth_provider: TokenProviderArc,
    request_timeout: Duration,
}

impl HttpDatastore {
    pub fn builder(database_id: DatabaseId) -> HttpDatastoreBuilder {
        HttpDatastoreBuilder::new(database_id)
    }

    pub fn from_database_id(database_id: DatabaseId) -> FirestoreResult<Self> {
        Self::builder(database_id).build()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn build_request_context(&self) -> FirestoreResult<RequestContext> {
        let auth_token = self.auth_provider.get_token().await?;
        Ok(RequestContext {
            auth_token,
            request_timeout: Some(self.request_timeout),
        })
    }
}

impl HttpDatastoreBuilder {
    fn new(database_id: DatabaseId) -> Self {
        Self {
            connection_builder: ConnectionBuilder::new(database_id),
            auth_provider: Arc::new(NoopTokenProvider),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_connection_builder(mut self, builder: ConnectionBuilder) -> Self {
        self.connection_builder = builder;
        self
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.connection_builder = self.connection_builder.with_api_key(api_key);
        self
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.connection_builder = self.connection_builder.with_emulator_host(host);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> FirestoreResult<HttpDatastore> {
        Ok(HttpDatastore {
            connection: self.connection_builder.build()?,
            auth_provider: self.auth_provider,
            request_timeout: self.request_timeout,
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Datastore for HttpDatastore {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<JsonValue>,
    ) -> FirestoreResult<JsonValue> {
        let context = self.build_request_context().await?;
        let result = self
            .connection
            .invoke_json(method, path, query, body, &context)
            .await;
        if let Err(err) = &result {
            if err.code == FirestoreErrorCode::Unauthenticated {
                self.auth_provider.invalidate_token();
            }
        }
        result
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::firestore::remote::datastore::{StaticTokenProvider, TokenProvider};
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::panic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        invalidations: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn get_token(&self) -> FirestoreResult<Option<String>> {
            Ok(Some("stale".to_string()))
        }

        fn invalidate_token(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn datastore_for(server: &MockServer, provider: TokenProviderArc) -> HttpDatastore {
        HttpDatastore::builder(DatabaseId::default("demo-project"))
            .with_emulator_host(server.address().to_string())
            .with_api_key("api-key")
            .with_auth_provider(provider)
            .build()
            .expect("datastore")
    }

    #[tokio::test]
    async fn sends_bearer_token_and_api_key() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping sends_bearer_token_and_api_key: unable to bind httpmock server in this environment.");
                return;
            }
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/demo-project/databases/(default)/documents:beginTransaction")
                .query_param("key", "api-key")
                .header("authorization", "Bearer secret")
                .json_body(json!({}));
            then.status(200).json_body(json!({ "transaction": "tx-1" }));
        });

        let datastore = datastore_for(&server, Arc::new(StaticTokenProvider::new("secret")));
        let response = datastore
            .invoke(Method::POST, "documents:beginTransaction", &[], Some(json!({})))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response["transaction"], json!("tx-1"));
    }

    #[tokio::test]
    async fn maps_error_envelopes() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping maps_error_envelopes: unable to bind httpmock server in this environment.");
                return;
            }
        };
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/demo-project/databases/(default)/documents:commit");
            then.status(409).json_body(json!({
                "error": { "code": 409, "message": "Transaction lock timeout.", "status": "ABORTED" }
            }));
        });

        let datastore = datastore_for(&server, Arc::new(NoopTokenProvider));
        let err = datastore
            .invoke(Method::POST, "documents:commit", &[], Some(json!({ "writes": [] })))
            .await
            .unwrap_err();

        assert_eq!(err.code_str(), "firestore/aborted");
        assert_eq!(err.message(), "Transaction lock timeout.");
        assert_eq!(err.remote().and_then(|remote| remote.status.as_deref()), Some("ABORTED"));
    }

    #[tokio::test]
    async fn unauthenticated_invalidates_token() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping unauthenticated_invalidates_token: unable to bind httpmock server in this environment.");
                return;
            }
        };
        server.mock(|when, then| {
            when.method(GET)
                .path("/v1/projects/demo-project/databases/(default)/documents/cities")
                .query_param("showMissing", "true");
            then.status(401).json_body(json!({
                "error": { "code": 401, "message": "expired", "status": "UNAUTHENTICATED" }
            }));
        });

        let provider = Arc::new(CountingProvider {
            invalidations: AtomicUsize::new(0),
        });
        let datastore = datastore_for(&server, provider.clone());
        let err = datastore
            .invoke(
                Method::GET,
                "documents/cities",
                &[("showMissing".to_string(), "true".to_string())],
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.code_str(), "firestore/unauthenticated");
        assert_eq!(provider.invalidations.load(Ordering::SeqCst), 1);
    }
}
