use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::firestore::api::operations::{SetOptions, Write};
use crate::firestore::constants::{AUTO_ID_LENGTH, MAX_PAGE_SIZE};
use crate::firestore::error::{internal_error, invalid_path, FirestoreResult};
use crate::firestore::model::{DocumentKey, IntoFieldPath, ResourcePath};
use crate::firestore::value::FirestoreValue;

use super::database::{Firestore, WriteResult};
use super::query::{FilterOperator, OrderDirection, Query, QuerySnapshot};
use super::snapshot::DocumentSnapshot;

/// A path resolved by segment parity: even (including the root) addresses a
/// document, odd a collection.
#[derive(Clone, Debug)]
pub enum Reference {
    Document(DocumentReference),
    Collection(CollectionReference),
}

impl Reference {
    /// Splits `path` on `/`, ignoring empty segments, and picks the reference kind.
    pub fn parse(firestore: &Firestore, path: &str) -> Self {
        Self::from_path(firestore, ResourcePath::from_string(path))
    }

    /// Same as [`parse`](Self::parse) for pre-split segments; segments that
    /// still contain `/` are split further.
    pub fn from_segments<I, S>(firestore: &Firestore, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_path(firestore, ResourcePath::from_parts(segments))
    }

    fn from_path(firestore: &Firestore, path: ResourcePath) -> Self {
        if path.is_document_path() {
            Reference::Document(DocumentReference {
                firestore: firestore.clone(),
                path,
            })
        } else {
            Reference::Collection(CollectionReference {
                firestore: firestore.clone(),
                path,
            })
        }
    }

    pub fn path(&self) -> String {
        match self {
            Reference::Document(document) => document.path(),
            Reference::Collection(collection) => collection.path(),
        }
    }

    pub fn as_document(&self) -> Option<&DocumentReference> {
        match self {
            Reference::Document(document) => Some(document),
            Reference::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionReference> {
        match self {
            Reference::Collection(collection) => Some(collection),
            Reference::Document(_) => None,
        }
    }

    pub fn into_document(self) -> FirestoreResult<DocumentReference> {
        match self {
            Reference::Document(document) => Ok(document),
            Reference::Collection(collection) => Err(invalid_path(format!(
                "Path '{}' points to a collection, not a document",
                collection.path()
            ))),
        }
    }

    pub fn into_collection(self) -> FirestoreResult<CollectionReference> {
        match self {
            Reference::Collection(collection) => Ok(collection),
            Reference::Document(document) => Err(invalid_path(format!(
                "Path '{}' points to a document, not a collection",
                document.path()
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollectionReference {
    firestore: Firestore,
    path: ResourcePath,
}

impl CollectionReference {
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        if path.is_document_path() {
            return Err(invalid_path(format!(
                "Collection references must point to a collection (odd number of segments), got '{path}'"
            )));
        }
        Ok(Self { firestore, path })
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// The last segment of the collection path.
    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// Slash-joined path relative to the database root, e.g. `rooms/eros/messages`.
    pub fn path(&self) -> String {
        self.path.canonical_string()
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.path
    }

    /// `projects/{p}/databases/{d}/documents/{path}`
    pub fn qualified_path(&self) -> String {
        self.firestore.database_id().qualified_path(&self.path)
    }

    /// The document that owns this collection, or `None` for a root collection.
    pub fn parent(&self) -> Option<DocumentReference> {
        if self.path.len() < 2 {
            return None;
        }
        Some(DocumentReference {
            firestore: self.firestore.clone(),
            path: self.path.without_last(),
        })
    }

    /// Reference to the document at `path` below this collection, or to a new
    /// document with a random 20 character id when `path` is `None`.
    pub fn doc(&self, path: Option<&str>) -> FirestoreResult<DocumentReference> {
        let relative = match path {
            Some(path) => ResourcePath::from_string(path),
            None => ResourcePath::from_segments([generate_auto_id()]),
        };
        DocumentReference::new(self.firestore.clone(), self.path.child(relative.iter().cloned()))
    }

    /// Creates a document with a generated id; fails if it already exists.
    pub async fn add(&self, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<DocumentReference> {
        let reference = self.doc(None)?;
        reference.create(data).await?;
        Ok(reference)
    }

    /// Lists every document of the collection, including missing documents
    /// that only have subcollections.
    pub async fn list_documents(&self) -> FirestoreResult<Vec<DocumentReference>> {
        let serializer = self.firestore.serializer();
        let path = serializer.relative_document_path(&self.path);
        let mut references = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("showMissing".to_string(), "true".to_string()),
                ("pageSize".to_string(), MAX_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken".to_string(), token));
            }
            let response = self.firestore.invoke(Method::GET, &path, &query, None).await?;
            let documents = response
                .get("documents")
                .and_then(JsonValue::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for document in documents {
                let name = document
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| internal_error("listDocuments entry is missing its 'name'"))?;
                let path = serializer.decode_resource_name(name)?;
                references.push(DocumentReference::new(self.firestore.clone(), path)?);
            }
            page_token = next_page_token(&response);
            if page_token.is_none() {
                return Ok(references);
            }
        }
    }

    /// An unfiltered query over this collection.
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    pub fn where_field(
        &self,
        field: impl IntoFieldPath,
        op: FilterOperator,
        value: impl Into<FirestoreValue>,
    ) -> FirestoreResult<Query> {
        self.query().where_field(field, op, value)
    }

    pub fn order_by(&self, field: impl IntoFieldPath, direction: OrderDirection) -> FirestoreResult<Query> {
        self.query().order_by(field, direction)
    }

    pub fn select<I, F>(&self, fields: I) -> FirestoreResult<Query>
    where
        I: IntoIterator<Item = F>,
        F: IntoFieldPath,
    {
        self.query().select(fields)
    }

    pub fn limit(&self, limit: u32) -> Query {
        self.query().limit(limit)
    }

    pub fn limit_to_last(&self, limit: u32) -> Query {
        self.query().limit_to_last(limit)
    }

    pub fn offset(&self, offset: u32) -> Query {
        self.query().offset(offset)
    }

    /// Fetches every document in the collection.
    pub async fn get(&self) -> FirestoreResult<QuerySnapshot> {
        self.query().get().await
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path.canonical_string())
    }
}

#[derive(Clone, Debug)]
pub struct DocumentReference {
    firestore: Firestore,
    path: ResourcePath,
}

impl DocumentReference {
    /// Accepts the root (empty) path; it can list collections but not be read
    /// or written.
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        if !path.is_document_path() {
            return Err(invalid_path(format!(
                "Document references must point to a document (even number of segments), got '{path}'"
            )));
        }
        Ok(Self { firestore, path })
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// The last path segment; `None` for the root document.
    pub fn id(&self) -> Option<&str> {
        self.path.last_segment()
    }

    pub fn path(&self) -> String {
        self.path.canonical_string()
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn qualified_path(&self) -> String {
        self.firestore.database_id().qualified_path(&self.path)
    }

    /// The collection containing this document; `None` for the root.
    pub fn parent(&self) -> Option<CollectionReference> {
        if self.path.is_empty() {
            return None;
        }
        Some(CollectionReference {
            firestore: self.firestore.clone(),
            path: self.path.without_last(),
        })
    }

    /// Reference to the subcollection at `path` below this document.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let relative = ResourcePath::from_string(path);
        CollectionReference::new(self.firestore.clone(), self.path.child(relative.iter().cloned()))
    }

    pub(crate) fn key(&self) -> FirestoreResult<DocumentKey> {
        DocumentKey::from_path(self.path.clone())
    }

    /// Reads the document; a missing document yields a snapshot with `exists() == false`.
    pub async fn get(&self) -> FirestoreResult<DocumentSnapshot> {
        let mut snapshots = self.firestore.get_all(std::slice::from_ref(self), None).await?;
        snapshots
            .pop()
            .ok_or_else(|| internal_error("batchGet returned no result for the requested document"))
    }

    /// Writes `data`, replacing the document unless `options` asks for a merge.
    pub async fn set(
        &self,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<WriteResult> {
        let write = Write::set(self.key()?, data, &options.unwrap_or_default())?;
        self.firestore.submit_write(write).await
    }

    /// Writes `data` only if the document does not exist yet.
    pub async fn create(&self, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<WriteResult> {
        let write = Write::create(self.key()?, data)?;
        self.firestore.submit_write(write).await
    }

    /// Updates the listed fields of an existing document. Keys may be dotted
    /// field paths.
    pub async fn update(&self, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<WriteResult> {
        let write = Write::update(self.key()?, data)?;
        self.firestore.submit_write(write).await
    }

    /// Deletes the document. Deleting a missing document succeeds.
    pub async fn delete(&self) -> FirestoreResult<WriteResult> {
        let write = Write::delete(self.key()?);
        self.firestore.submit_write(write).await
    }

    /// Lists the subcollections of this document.
    pub async fn list_collections(&self) -> FirestoreResult<Vec<CollectionReference>> {
        self.firestore.list_collection_ids(&self.path).await
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.path.canonical_string())
    }
}

impl From<&DocumentReference> for FirestoreValue {
    fn from(reference: &DocumentReference) -> Self {
        FirestoreValue::from_reference(reference.qualified_path())
    }
}

impl From<DocumentReference> for FirestoreValue {
    fn from(reference: DocumentReference) -> Self {
        FirestoreValue::from(&reference)
    }
}

pub(crate) fn next_page_token(response: &JsonValue) -> Option<String> {
    response
        .get("nextPageToken")
        .and_then(JsonValue::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Random 20 character alphanumeric id, as generated for `doc(None)`.
pub(crate) fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}

pub(crate) fn list_collection_ids_body(page_token: Option<String>) -> JsonValue {
    let mut body = json!({ "pageSize": MAX_PAGE_SIZE });
    if let Some(token) = page_token {
        body["pageToken"] = JsonValue::String(token);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{firestore_with, RecordingDatastore};
    use std::sync::Arc;

    fn firestore() -> Firestore {
        firestore_with(Arc::new(RecordingDatastore::new()))
    }

    #[test]
    fn parity_selects_reference_kind() {
        let firestore = firestore();
        for (path, is_document) in [
            ("", true),
            ("cities", false),
            ("cities/sf", true),
            ("/cities/sf/landmarks/", false),
            ("cities//sf/landmarks/golden-gate", true),
        ] {
            let reference = Reference::parse(&firestore, path);
            assert_eq!(reference.as_document().is_some(), is_document, "path {path:?}");
        }
        let reference = Reference::parse(&firestore, "/cities//sf/");
        assert_eq!(reference.path(), "cities/sf");
        let reference = Reference::from_segments(&firestore, ["cities", "sf/landmarks"]);
        assert_eq!(reference.into_collection().unwrap().path(), "cities/sf/landmarks");
    }

    #[test]
    fn root_document_has_no_id_or_parent() {
        let root = Reference::parse(&firestore(), "").into_document().unwrap();
        assert_eq!(root.id(), None);
        assert!(root.parent().is_none());
        assert_eq!(root.qualified_path(), "projects/demo-project/databases/(default)/documents");
        assert_eq!(root.collection("cities").unwrap().path(), "cities");
    }

    #[test]
    fn wrong_parity_is_invalid_path() {
        let firestore = firestore();
        let err = firestore.doc("cities").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
        let err = firestore.collection("cities/sf").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
        let cities = firestore.collection("cities").unwrap();
        let err = cities.doc(Some("sf/landmarks")).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
        let err = cities.doc(Some("")).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
        let err = Reference::parse(&firestore, "cities").into_document().unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
    }

    #[test]
    fn navigation_alternates_kinds() {
        let firestore = firestore();
        let landmarks = firestore.collection("cities/sf/landmarks").unwrap();
        assert_eq!(landmarks.id(), "landmarks");
        let sf = landmarks.parent().unwrap();
        assert_eq!(sf.id(), Some("sf"));
        assert_eq!(sf.path(), "cities/sf");
        assert_eq!(sf.parent().unwrap().path(), "cities");
        assert!(sf.parent().unwrap().parent().is_none());
        assert_eq!(
            landmarks.doc(Some("bridge")).unwrap().qualified_path(),
            "projects/demo-project/databases/(default)/documents/cities/sf/landmarks/bridge"
        );
        assert_eq!(
            firestore.collection("cities").unwrap().doc(Some("sf/landmarks/bridge")).unwrap().path(),
            "cities/sf/landmarks/bridge"
        );
    }

    #[test]
    fn auto_ids_are_distinct() {
        let cities = firestore().collection("cities").unwrap();
        let first = cities.doc(None).unwrap();
        let second = cities.doc(None).unwrap();
        let first_id = first.id().unwrap();
        let second_id = second.id().unwrap();
        assert_eq!(first_id.len(), 20);
        assert!(first_id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!second_id.is_empty());
        assert_ne!(first_id, second_id);
    }

    #[test]
    fn references_convert_to_reference_values() {
        let sf = firestore().doc("cities/sf").unwrap();
        let value = FirestoreValue::from(&sf);
        assert_eq!(
            value.kind(),
            &crate::firestore::value::ValueKind::Reference(
                "projects/demo-project/databases/(default)/documents/cities/sf".to_string()
            )
        );
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod async_tests {
    use super::*;
    use crate::test_support::{firestore_with, RecordingDatastore};
    use std::sync::Arc;

    #[tokio::test]
    async fn root_document_cannot_be_written() {
        let datastore = Arc::new(RecordingDatastore::new());
        let firestore = firestore_with(datastore.clone());
        let root = Reference::parse(&firestore, "").into_document().unwrap();
        let err = root.delete().await.unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path");
        assert!(datastore.requests().is_empty());
    }

    #[tokio::test]
    async fn set_commits_single_write() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({
            "writeResults": [{ "updateTime": "2024-05-01T10:00:00Z" }],
            "commitTime": "2024-05-01T10:00:00Z"
        }));
        let firestore = firestore_with(datastore.clone());
        let sf = firestore.doc("cities/sf").unwrap();

        let mut data = BTreeMap::new();
        data.insert("name".to_string(), FirestoreValue::from("San Francisco"));
        let result = sf.set(data, Some(SetOptions::merge_all())).await.unwrap();

        assert!(result.update_time().is_some());
        let requests = datastore.requests();
        assert_eq!(requests[0].path, "documents:commit");
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["writes"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["writes"][0]["update"]["name"],
            json!("projects/demo-project/databases/(default)/documents/cities/sf")
        );
        assert_eq!(body["writes"][0]["updateMask"], json!({ "fieldPaths": ["name"] }));
    }

    #[tokio::test]
    async fn add_uses_create_precondition() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "commitTime": "2024-05-01T10:00:00Z" }));
        let firestore = firestore_with(datastore.clone());
        let mut data = BTreeMap::new();
        data.insert("text".to_string(), FirestoreValue::from("hello"));

        let reference = firestore.collection("messages").unwrap().add(data).await.unwrap();

        assert_eq!(reference.id().map(str::len), Some(20));
        let body = datastore.requests()[0].body.clone().unwrap();
        assert_eq!(body["writes"][0]["currentDocument"], json!({ "exists": false }));
    }

    #[tokio::test]
    async fn missing_document_is_not_an_error() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!([{
            "missing": "projects/demo-project/databases/(default)/documents/cities/atlantis",
            "readTime": "2024-05-01T10:00:00Z"
        }]));
        let firestore = firestore_with(datastore.clone());

        let snapshot = firestore.doc("cities/atlantis").unwrap().get().await.unwrap();

        assert!(!snapshot.exists());
        assert_eq!(snapshot.id(), "atlantis");
        assert!(snapshot.read_time().is_some());
        assert_eq!(datastore.requests()[0].path, "documents:batchGet");
    }

    #[tokio::test]
    async fn lists_documents_across_pages() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({
            "documents": [{ "name": "projects/demo-project/databases/(default)/documents/cities/a" }],
            "nextPageToken": "page-2"
        }));
        datastore.push_response(json!({
            "documents": [{ "name": "projects/demo-project/databases/(default)/documents/cities/b" }]
        }));
        let firestore = firestore_with(datastore.clone());

        let documents = firestore.collection("cities").unwrap().list_documents().await.unwrap();

        let ids: Vec<_> = documents.iter().filter_map(DocumentReference::id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let requests = datastore.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].path, "documents/cities");
        assert!(requests[0]
            .query
            .contains(&("showMissing".to_string(), "true".to_string())));
        assert!(requests[1]
            .query
            .contains(&("pageToken".to_string(), "page-2".to_string())));
    }

    #[tokio::test]
    async fn lists_subcollections() {
        let datastore = Arc::new(RecordingDatastore::new());
        datastore.push_response(json!({ "collectionIds": ["landmarks", "neighborhoods"] }));
        let firestore = firestore_with(datastore.clone());

        let collections = firestore.doc("cities/sf").unwrap().list_collections().await.unwrap();

        let paths: Vec<_> = collections.iter().map(CollectionReference::path).collect();
        assert_eq!(paths, vec!["cities/sf/landmarks", "cities/sf/neighborhoods"]);
        let requests = datastore.requests();
        assert_eq!(requests[0].path, "documents/cities/sf:listCollectionIds");
        assert_eq!(requests[0].body, Some(json!({ "pageSize": MAX_PAGE_SIZE })));
    }
}
