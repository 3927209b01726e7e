use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::firestore::error::{unauthenticated, FirestoreResult};
use crate::platform::token::AsyncTokenProvider;

pub mod http;

/// Authenticated request primitive every Firestore operation is built on.
///
/// `path` is relative to `projects/{project}/databases/{database}` and already
/// percent-encoded (for example `documents/cities/sf:listCollectionIds`).
/// Implementations surface `{"error": {...}}` responses as remote errors.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Datastore: Send + Sync + 'static {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<JsonValue>,
    ) -> FirestoreResult<JsonValue>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> FirestoreResult<Option<String>>;
    fn invalidate_token(&self);
}

/// Sends requests without an `Authorization` header (emulator, open rules).
#[derive(Default, Clone)]
pub struct NoopTokenProvider;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(None)
    }

    fn invalidate_token(&self) {}
}

/// Always returns the same bearer token, e.g. one minted by the caller.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(Some(self.token.clone()))
    }

    fn invalidate_token(&self) {}
}

/// Adapts an [`AsyncTokenProvider`] (OAuth access tokens, service-account JWTs)
/// to the datastore. A rejected token forces a refresh on the next request.
pub struct AsyncTokenProviderAdapter<P> {
    provider: P,
    force_refresh: AtomicBool,
}

impl<P> AsyncTokenProviderAdapter<P>
where
    P: AsyncTokenProvider,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            force_refresh: AtomicBool::new(false),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl<P> TokenProvider for AsyncTokenProviderAdapter<P>
where
    P: AsyncTokenProvider + 'static,
{
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        let force_refresh = self.force_refresh.swap(false, Ordering::SeqCst);
        self.provider
            .get_token(force_refresh)
            .await
            .map_err(|err| unauthenticated(format!("Failed to obtain access token: {err}")))
    }

    fn invalidate_token(&self) {
        self.force_refresh.store(true, Ordering::SeqCst);
    }
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;

pub use http::{HttpDatastore, HttpDatastoreBuilder};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::platform::token::TokenError;
    use std::sync::Mutex;

    struct RecordingProvider {
        calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl AsyncTokenProvider for RecordingProvider {
        async fn get_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
            self.calls.lock().unwrap().push(force_refresh);
            if force_refresh {
                Err(TokenError::new("refresh failed"))
            } else {
                Ok(Some("token".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn adapter_refreshes_after_invalidation() {
        let adapter = AsyncTokenProviderAdapter::new(RecordingProvider {
            calls: Mutex::new(Vec::new()),
        });
        assert_eq!(adapter.get_token().await.unwrap().as_deref(), Some("token"));
        adapter.invalidate_token();
        let err = adapter.get_token().await.unwrap_err();
        assert_eq!(err.code_str(), "firestore/unauthenticated");
        assert_eq!(adapter.get_token().await.unwrap().as_deref(), Some("token"));
        assert_eq!(*adapter.provider.calls.lock().unwrap(), vec![false, true, false]);
    }

    #[tokio::test]
    async fn static_provider_returns_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.get_token().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(NoopTokenProvider.get_token().await.unwrap(), None);
    }
}
