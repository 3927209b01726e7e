use std::collections::BTreeMap;

use crate::firestore::api::operations::{SetOptions, Write};
use crate::firestore::error::{failed_precondition, internal_error, FirestoreResult};
use crate::firestore::model::FieldPath;
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::query::{Query, QuerySnapshot};
use super::reference::DocumentReference;
use super::snapshot::DocumentSnapshot;

/// Handle passed to the body of [`Firestore::run_transaction`].
///
/// Reads go to the server immediately and carry the transaction token. Writes
/// are buffered on the store and sent together when the body returns `Ok`.
#[derive(Clone, Debug)]
pub struct Transaction {
    firestore: Firestore,
    token: String,
}

impl Transaction {
    pub(crate) fn new(firestore: Firestore, token: String) -> Self {
        Self { firestore, token }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// Opaque server token of this transaction while it is running.
    pub fn token(&self) -> Option<String> {
        self.is_active().then(|| self.token.clone())
    }

    pub async fn get(&self, reference: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
        let mut snapshots = self.get_all(std::slice::from_ref(reference), None).await?;
        snapshots
            .pop()
            .ok_or_else(|| internal_error("batchGet returned no snapshot"))
    }

    pub async fn get_all(
        &self,
        references: &[DocumentReference],
        field_mask: Option<&[FieldPath]>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.ensure_active()?;
        self.firestore.get_all(references, field_mask).await
    }

    pub async fn get_query(&self, query: &Query) -> FirestoreResult<QuerySnapshot> {
        self.ensure_active()?;
        query.get().await
    }

    pub fn set(
        &self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<&Self> {
        let write = Write::set(reference.key()?, data, &options.unwrap_or_default())?;
        self.firestore.buffer_write(write, &self.token)?;
        Ok(self)
    }

    pub fn create(
        &self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&Self> {
        let write = Write::create(reference.key()?, data)?;
        self.firestore.buffer_write(write, &self.token)?;
        Ok(self)
    }

    pub fn update(
        &self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&Self> {
        let write = Write::update(reference.key()?, data)?;
        self.firestore.buffer_write(write, &self.token)?;
        Ok(self)
    }

    pub fn delete(&self, reference: &DocumentReference) -> FirestoreResult<&Self> {
        self.firestore
            .buffer_write(Write::delete(reference.key()?), &self.token)?;
        Ok(self)
    }

    fn is_active(&self) -> bool {
        self.firestore.transaction_token().as_deref() == Some(self.token.as_str())
    }

    fn ensure_active(&self) -> FirestoreResult<()> {
        if !self.is_active() {
            return Err(failed_precondition(
                "The transaction has already completed; reads can no longer be issued",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{firestore_with, RecordingDatastore};
    use std::sync::Arc;

    #[test]
    fn writes_outside_transaction_fail() {
        let firestore = firestore_with(Arc::new(RecordingDatastore::new()));
        let doc = firestore.doc("cities/sf").unwrap();
        let transaction = Transaction::new(firestore.clone(), "tx-done".to_string());

        let err = transaction.delete(&doc).unwrap_err();
        assert_eq!(err.code_str(), "firestore/failed-precondition");
        assert_eq!(transaction.token(), None);
    }

    #[test]
    fn rejects_root_document() {
        let firestore = firestore_with(Arc::new(RecordingDatastore::new()));
        let root = firestore.doc("").unwrap();
        let transaction = Transaction::new(firestore, "tx-done".to_string());

        let err = transaction.delete(&root).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod async_tests {
    use super::*;
    use crate::firestore::api::FilterOperator;
    use crate::test_support::{firestore_with, RecordingDatastore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_after_completion_fail() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "transaction": "tx-1" }));
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:00Z" }));
        let firestore = firestore_with(datastore.clone());
        let doc = firestore.doc("cities/sf").unwrap();

        let leaked = firestore
            .run_transaction(|transaction| async move { Ok(transaction) })
            .await
            .unwrap();

        let err = leaked.get(&doc).await.unwrap_err();
        assert_eq!(err.code_str(), "firestore/failed-precondition");
        assert_eq!(datastore.requests().len(), 2);
    }

    #[tokio::test]
    async fn completed_handle_cannot_join_later_transaction() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "transaction": "tx-1" }));
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:00Z" }));
        datastore.push_response(json!({ "transaction": "tx-2" }));
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:01Z" }));
        let firestore = firestore_with(datastore.clone());
        let doc = firestore.doc("cities/sf").unwrap();

        let leaked = firestore
            .run_transaction(|transaction| async move { Ok(transaction) })
            .await
            .unwrap();

        firestore
            .run_transaction(|current| {
                let (leaked, doc) = (leaked.clone(), doc.clone());
                async move {
                    assert_eq!(current.token().as_deref(), Some("tx-2"));
                    assert_eq!(leaked.token(), None);
                    let err = leaked.delete(&doc).unwrap_err();
                    assert_eq!(err.code_str(), "firestore/failed-precondition");
                    let err = leaked.get(&doc).await.unwrap_err();
                    assert_eq!(err.code_str(), "firestore/failed-precondition");
                    Ok(())
                }
            })
            .await
            .unwrap();

        let requests = datastore.requests();
        assert_eq!(requests.len(), 4);
        let commit = requests[3].body.as_ref().unwrap();
        assert_eq!(commit["transaction"], json!("tx-2"));
        assert!(commit["writes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn buffered_writes_commit_in_order() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "transaction": "tx-5" }));
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:00Z" }));
        let firestore = firestore_with(datastore.clone());
        let sf = firestore.doc("cities/sf").unwrap();
        let la = firestore.doc("cities/la").unwrap();

        firestore
            .run_transaction(|transaction| {
                let (sf, la) = (sf.clone(), la.clone());
                async move {
                    assert_eq!(transaction.token().as_deref(), Some("tx-5"));
                    let mut data = BTreeMap::new();
                    data.insert("name".to_string(), FirestoreValue::from("San Francisco"));
                    transaction.set(&sf, data, None)?.delete(&la)?;
                    Ok(())
                }
            })
            .await
            .unwrap();

        let requests = datastore.requests();
        assert_eq!(requests.len(), 2);
        let writes = requests[1].body.as_ref().unwrap()["writes"].as_array().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert!(writes[0]["update"]["name"].as_str().unwrap().ends_with("/cities/sf"));
        assert!(writes[1]["delete"].as_str().unwrap().ends_with("/cities/la"));
    }

    #[tokio::test]
    async fn query_reads_carry_token() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "transaction": "tx-q" }));
        datastore.push_response(json!([{ "readTime": "2024-05-01T10:00:00Z" }]));
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:00Z" }));
        let firestore = firestore_with(datastore.clone());
        let query = firestore
            .collection("cities")
            .unwrap()
            .where_field("state", FilterOperator::Equal, "CA")
            .unwrap();

        let size = firestore
            .run_transaction(|transaction| {
                let query = query.clone();
                async move { Ok(transaction.get_query(&query).await?.size()) }
            })
            .await
            .unwrap();

        assert_eq!(size, 0);
        let requests = datastore.requests();
        assert_eq!(requests[1].path, "documents:runQuery");
        assert_eq!(requests[1].body.as_ref().unwrap()["transaction"], json!("tx-q"));
    }
}
