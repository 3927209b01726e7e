use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::firestore::api::operations::Write;
use crate::firestore::error::{
    failed_precondition, internal_error, missing_project_id, transaction_in_progress, FirestoreResult,
};
use crate::firestore::logger::LOGGER;
use crate::firestore::model::{DatabaseId, FieldPath, ResourcePath, Timestamp};
use crate::firestore::remote::datastore::{Datastore, HttpDatastore, TokenProviderArc};
use crate::firestore::remote::serializer::JsonProtoSerializer;

use super::reference::{list_collection_ids_body, next_page_token, CollectionReference, DocumentReference, Reference};
use super::snapshot::DocumentSnapshot;
use super::transaction::Transaction;
use super::write_batch::WriteBatch;

/// Connection settings, deserializable from the camelCase JSON used by
/// Firebase web configs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreSettings {
    pub project_id: Option<String>,
    /// Database name or `projects/{p}/databases/{d}`; defaults to `(default)`.
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// `host:port` of a local emulator. `FIRESTORE_EMULATOR_HOST` is used when unset.
    #[serde(default)]
    pub emulator_host: Option<String>,
}

impl FirestoreSettings {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }
}

/// Outcome of one committed write. Writes buffered inside a transaction
/// report no time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteResult {
    update_time: Option<Timestamp>,
}

impl WriteResult {
    pub(crate) fn new(update_time: Option<Timestamp>) -> Self {
        Self { update_time }
    }

    pub fn update_time(&self) -> Option<&Timestamp> {
        self.update_time.as_ref()
    }
}

/// Handle to one Firestore database. Cheap to clone; clones share the
/// datastore and the transaction slot.
#[derive(Clone)]
pub struct Firestore {
    inner: Arc<FirestoreInner>,
}

struct FirestoreInner {
    database_id: DatabaseId,
    serializer: JsonProtoSerializer,
    datastore: Arc<dyn Datastore>,
    transaction: Mutex<Option<ActiveTransaction>>,
}

/// State of the transaction currently running on a store. The token is
/// `None` only between reserving the slot and `beginTransaction` returning.
#[derive(Default)]
struct ActiveTransaction {
    token: Option<String>,
    pending_writes: Vec<Write>,
}

/// Frees the transaction slot when the transaction ends, including when the
/// `run_transaction` future is dropped mid-flight.
struct TransactionGuard {
    firestore: Firestore,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.firestore.transaction_state().take();
    }
}

impl Firestore {
    pub fn new(database_id: DatabaseId, datastore: Arc<dyn Datastore>) -> Self {
        let inner = FirestoreInner {
            serializer: JsonProtoSerializer::new(database_id.clone()),
            database_id,
            datastore,
            transaction: Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Builds a store that talks to the REST API (or the emulator) over HTTP.
    pub fn from_settings(settings: FirestoreSettings, token_provider: TokenProviderArc) -> FirestoreResult<Self> {
        let project_id = settings
            .project_id
            .as_deref()
            .filter(|project| !project.is_empty())
            .ok_or_else(missing_project_id)?;
        let database_id = DatabaseId::parse(Some(project_id), settings.database_id.as_deref())?;

        let mut builder = HttpDatastore::builder(database_id.clone()).with_auth_provider(token_provider);
        if let Some(api_key) = settings.api_key {
            builder = builder.with_api_key(api_key);
        }
        if let Some(host) = settings.emulator_host {
            builder = builder.with_emulator_host(host);
        }
        let datastore = builder.build()?;
        Ok(Self::new(database_id, Arc::new(datastore)))
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    pub fn project_id(&self) -> &str {
        self.inner.database_id.project_id()
    }

    pub(crate) fn serializer(&self) -> &JsonProtoSerializer {
        &self.inner.serializer
    }

    /// Resolves `path` to a document or collection reference by segment parity.
    pub fn reference(&self, path: &str) -> Reference {
        Reference::parse(self, path)
    }

    pub fn reference_from_segments<I, S>(&self, segments: I) -> Reference
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Reference::from_segments(self, segments)
    }

    /// Creates a `CollectionReference`; `path` must have an odd number of segments.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        CollectionReference::new(self.clone(), ResourcePath::from_string(path))
    }

    /// Creates a `DocumentReference`; `path` must have an even number of segments.
    pub fn doc(&self, path: &str) -> FirestoreResult<DocumentReference> {
        DocumentReference::new(self.clone(), ResourcePath::from_string(path))
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Lists the root collections of the database.
    pub async fn list_collections(&self) -> FirestoreResult<Vec<CollectionReference>> {
        self.list_collection_ids(&ResourcePath::root()).await
    }

    /// Reads several documents in one `batchGet` round trip. Snapshots come
    /// back in the order of `references`, whatever order the server used.
    pub async fn get_all(
        &self,
        references: &[DocumentReference],
        field_mask: Option<&[FieldPath]>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }
        let serializer = self.serializer();
        let names = references
            .iter()
            .map(|reference| reference.key().map(|key| serializer.document_name(&key)))
            .collect::<FirestoreResult<Vec<_>>>()?;

        let mut body = json!({ "documents": names });
        if let Some(mask) = field_mask {
            let field_paths: Vec<_> = mask.iter().map(FieldPath::canonical_string).collect();
            body["mask"] = json!({ "fieldPaths": field_paths });
        }
        if let Some(token) = self.transaction_token() {
            body["transaction"] = JsonValue::String(token);
        }

        let response = self
            .invoke(Method::POST, "documents:batchGet", &[], Some(body))
            .await?;
        let entries = match response {
            JsonValue::Array(entries) => entries,
            single @ JsonValue::Object(_) => vec![single],
            _ => return Err(internal_error("batchGet returned an unexpected payload")),
        };

        let mut by_path: HashMap<ResourcePath, DocumentSnapshot> = HashMap::new();
        for entry in &entries {
            let read_time = serializer.decode_timestamp(entry, "readTime")?;
            if let Some(found) = entry.get("found") {
                let decoded = serializer.decode_document(found)?;
                let reference = DocumentReference::new(self.clone(), decoded.path.clone())?;
                by_path.insert(decoded.path.clone(), DocumentSnapshot::found(reference, decoded, read_time));
            } else if let Some(name) = entry.get("missing").and_then(JsonValue::as_str) {
                let path = serializer.decode_resource_name(name)?;
                let reference = DocumentReference::new(self.clone(), path.clone())?;
                by_path.insert(path, DocumentSnapshot::missing(reference, read_time));
            }
        }

        references
            .iter()
            .map(|reference| {
                by_path.get(reference.resource_path()).cloned().ok_or_else(|| {
                    internal_error(format!(
                        "batchGet response did not include document '{}'",
                        reference.path()
                    ))
                })
            })
            .collect()
    }

    /// Runs `body` inside a transaction.
    ///
    /// Reads made while the body runs carry the transaction token and writes
    /// are buffered, then sent with the token in a single commit once the body
    /// succeeds. If the body fails, the transaction is rolled back and the
    /// body's error is returned. Conflicts surface as `Aborted` errors; the
    /// body is never retried.
    ///
    /// Only one transaction may run per store at a time; a second concurrent
    /// call fails with `TransactionInProgress`.
    pub async fn run_transaction<F, Fut, T>(&self, body: F) -> FirestoreResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let _guard = self.reserve_transaction()?;

        let response = self
            .invoke(Method::POST, "documents:beginTransaction", &[], Some(json!({})))
            .await?;
        let token = response
            .get("transaction")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| internal_error("beginTransaction response is missing 'transaction'"))?
            .to_string();
        if let Some(active) = self.transaction_state().as_mut() {
            active.token = Some(token.clone());
        }
        LOGGER.debug("Transaction started");

        match body(Transaction::new(self.clone(), token.clone())).await {
            Ok(value) => {
                let writes = self.take_pending_writes();
                let count = writes.len();
                self.commit_writes(writes, Some(&token)).await?;
                LOGGER.debug(format!("Transaction committed with {count} write(s)"));
                Ok(value)
            }
            Err(err) => {
                self.rollback(&token).await;
                Err(err)
            }
        }
    }

    /// Token of the transaction currently running on this store, if any.
    pub fn transaction_token(&self) -> Option<String> {
        self.transaction_state()
            .as_ref()
            .and_then(|active| active.token.clone())
    }

    pub(crate) async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<JsonValue>,
    ) -> FirestoreResult<JsonValue> {
        self.inner.datastore.invoke(method, path, query, body).await
    }

    /// Commits `writes` atomically and returns one result per write, in order.
    pub(crate) async fn commit_writes(
        &self,
        writes: Vec<Write>,
        transaction: Option<&str>,
    ) -> FirestoreResult<Vec<WriteResult>> {
        let serializer = self.serializer();
        let encoded = writes
            .iter()
            .map(|write| serializer.encode_write(write))
            .collect::<FirestoreResult<Vec<_>>>()?;
        let mut body = json!({ "writes": encoded });
        if let Some(token) = transaction {
            body["transaction"] = JsonValue::String(token.to_string());
        }

        let response = self
            .invoke(Method::POST, "documents:commit", &[], Some(body))
            .await?;
        let commit_time = serializer.decode_timestamp(&response, "commitTime")?;
        let write_results = response
            .get("writeResults")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        (0..writes.len())
            .map(|index| -> FirestoreResult<WriteResult> {
                let update_time = match write_results.get(index) {
                    Some(result) => serializer.decode_timestamp(result, "updateTime")?,
                    None => None,
                };
                Ok(WriteResult::new(update_time.or(commit_time)))
            })
            .collect()
    }

    /// Commits `writes` atomically, or appends them to the running
    /// transaction's buffer.
    pub(crate) async fn submit_writes(&self, writes: Vec<Write>) -> FirestoreResult<Vec<WriteResult>> {
        let writes = {
            let mut state = self.transaction_state();
            match state.as_mut() {
                Some(active) => {
                    let count = writes.len();
                    active.pending_writes.extend(writes);
                    return Ok(vec![WriteResult::default(); count]);
                }
                None => writes,
            }
        };
        self.commit_writes(writes, None).await
    }

    /// Commits one write, or buffers it when a transaction is running.
    pub(crate) async fn submit_write(&self, write: Write) -> FirestoreResult<WriteResult> {
        let mut results = self.submit_writes(vec![write]).await?;
        results
            .pop()
            .ok_or_else(|| internal_error("commit returned no write result"))
    }

    /// Appends a write to the transaction identified by `token`.
    pub(crate) fn buffer_write(&self, write: Write, token: &str) -> FirestoreResult<()> {
        match self.transaction_state().as_mut() {
            Some(active) if active.token.as_deref() == Some(token) => {
                active.pending_writes.push(write);
                Ok(())
            }
            _ => Err(failed_precondition(
                "The transaction has already completed; writes can no longer be added",
            )),
        }
    }

    pub(crate) async fn list_collection_ids(
        &self,
        parent: &ResourcePath,
    ) -> FirestoreResult<Vec<CollectionReference>> {
        let path = format!(
            "{}:listCollectionIds",
            self.serializer().relative_document_path(parent)
        );
        let mut collections = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = list_collection_ids_body(page_token.take());
            let response = self.invoke(Method::POST, &path, &[], Some(body)).await?;
            let ids = response
                .get("collectionIds")
                .and_then(JsonValue::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for id in ids.iter().filter_map(JsonValue::as_str) {
                collections.push(CollectionReference::new(self.clone(), parent.child([id]))?);
            }
            page_token = next_page_token(&response);
            if page_token.is_none() {
                return Ok(collections);
            }
        }
    }

    fn transaction_state(&self) -> MutexGuard<'_, Option<ActiveTransaction>> {
        self.inner
            .transaction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reserve_transaction(&self) -> FirestoreResult<TransactionGuard> {
        let mut state = self.transaction_state();
        if state.is_some() {
            return Err(transaction_in_progress());
        }
        *state = Some(ActiveTransaction::default());
        Ok(TransactionGuard {
            firestore: self.clone(),
        })
    }

    fn take_pending_writes(&self) -> Vec<Write> {
        self.transaction_state()
            .as_mut()
            .map(|active| std::mem::take(&mut active.pending_writes))
            .unwrap_or_default()
    }

    async fn rollback(&self, token: &str) {
        self.take_pending_writes();
        let body = json!({ "transaction": token });
        match self
            .invoke(Method::POST, "documents:rollback", &[], Some(body))
            .await
        {
            Ok(_) => LOGGER.debug("Transaction rolled back"),
            Err(err) => LOGGER.warn(format!("Failed to roll back transaction: {err}")),
        }
    }
}

impl Debug for Firestore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firestore")
            .field("database_id", &self.inner.database_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::remote::datastore::NoopTokenProvider;

    #[test]
    fn settings_deserialize_from_camel_case() {
        let settings: FirestoreSettings = serde_json::from_value(json!({
            "projectId": "demo",
            "databaseId": "staging",
            "apiKey": "key",
            "emulatorHost": "localhost:8080"
        }))
        .unwrap();
        assert_eq!(
            settings,
            FirestoreSettings::new("demo")
                .with_database_id("staging")
                .with_api_key("key")
                .with_emulator_host("localhost:8080")
        );

        let firestore = Firestore::from_settings(settings, Arc::new(NoopTokenProvider)).unwrap();
        assert_eq!(firestore.project_id(), "demo");
        assert_eq!(firestore.database_id().database(), "staging");
    }

    #[test]
    fn settings_require_project_id() {
        let err = Firestore::from_settings(FirestoreSettings::default(), Arc::new(NoopTokenProvider))
            .unwrap_err();
        assert_eq!(err.code_str(), "firestore/missing-project-id");
    }
}
