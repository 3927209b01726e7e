use crate::firestore::error::{invalid_path, FirestoreResult};
use crate::firestore::model::ResourcePath;

/// Target of a write: the path of a concrete document. Unlike a
/// `DocumentReference`, a key can never be the database root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> FirestoreResult<Self> {
        if path.is_empty() {
            return Err(invalid_path("Writes cannot target the database root"));
        }
        if !path.is_document_path() {
            return Err(invalid_path(format!(
                "Document paths need an even number of segments, but '{path}' has {}",
                path.len()
            )));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Self::from_path(ResourcePath::from_string(path))
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }
}
