use std::collections::BTreeMap;

use crate::firestore::api::operations::{SetOptions, Write};
use crate::firestore::constants::MAX_BATCH_WRITES;
use crate::firestore::error::{invalid_argument, resource_exhausted, FirestoreResult};
use crate::firestore::logger::LOGGER;
use crate::firestore::value::FirestoreValue;

use super::database::{Firestore, WriteResult};
use super::reference::DocumentReference;

/// Collects writes and commits them in one atomic request.
///
/// Writes are applied by the server in the order they were added. `commit`
/// consumes the batch, so a committed batch can never be sent twice.
#[derive(Clone, Debug)]
pub struct WriteBatch {
    firestore: Firestore,
    writes: Vec<Write>,
}

impl WriteBatch {
    pub(crate) fn new(firestore: Firestore) -> Self {
        Self {
            firestore,
            writes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn set(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference)?;
        let write = Write::set(reference.key()?, data, &options.unwrap_or_default())?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn create(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference)?;
        let write = Write::create(reference.key()?, data)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn update(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference)?;
        let write = Write::update(reference.key()?, data)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn delete(&mut self, reference: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference)?;
        self.writes.push(Write::delete(reference.key()?));
        Ok(self)
    }

    /// Commits all queued writes atomically, returning one result per write
    /// in insertion order. An empty batch sends nothing.
    ///
    /// While a transaction runs on the store, the writes join its buffer
    /// instead and are sent with the transaction's commit.
    pub async fn commit(self) -> FirestoreResult<Vec<WriteResult>> {
        if self.writes.is_empty() {
            LOGGER.debug("Skipping commit of empty WriteBatch");
            return Ok(Vec::new());
        }
        self.firestore.submit_writes(self.writes).await
    }

    fn ensure_same_firestore(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        if self.firestore.database_id() != reference.firestore().database_id() {
            return Err(invalid_argument(
                "All WriteBatch operations must target the same Firestore database",
            ));
        }
        Ok(())
    }

    fn ensure_capacity(&self) -> FirestoreResult<()> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "WriteBatch cannot contain more than {MAX_BATCH_WRITES} operations"
            )));
        }
        Ok(())
    }
}
