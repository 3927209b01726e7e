use std::collections::BTreeMap;

use crate::firestore::api::operations::value_for_segments;
use crate::firestore::model::{IntoFieldPath, Timestamp};
use crate::firestore::remote::serializer::DecodedDocument;
use crate::firestore::value::{FirestoreValue, MapValue};

use super::reference::DocumentReference;

/// A document read at `read_time`. A missing document is a snapshot whose
/// [`exists`](Self::exists) is `false`, never an error.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    reference: DocumentReference,
    data: Option<MapValue>,
    read_time: Option<Timestamp>,
    create_time: Option<Timestamp>,
    update_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub(crate) fn found(
        reference: DocumentReference,
        document: DecodedDocument,
        read_time: Option<Timestamp>,
    ) -> Self {
        Self {
            reference,
            data: Some(document.fields),
            read_time,
            create_time: document.create_time,
            update_time: document.update_time,
        }
    }

    pub(crate) fn missing(reference: DocumentReference, read_time: Option<Timestamp>) -> Self {
        Self {
            reference,
            data: None,
            read_time,
            create_time: None,
            update_time: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_fields(
        reference: DocumentReference,
        fields: BTreeMap<String, FirestoreValue>,
    ) -> Self {
        Self {
            reference,
            data: Some(MapValue::new(fields)),
            read_time: None,
            create_time: None,
            update_time: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> &str {
        self.reference.id().unwrap_or_default()
    }

    pub fn reference(&self) -> &DocumentReference {
        &self.reference
    }

    /// The decoded fields, or `None` when the document does not exist.
    pub fn data(&self) -> Option<&BTreeMap<String, FirestoreValue>> {
        self.data.as_ref().map(|map| map.fields())
    }

    /// Looks up a possibly nested field such as `"address.city"`.
    ///
    /// Returns `None` when the document is missing, any segment is absent, an
    /// intermediate value is not a map, or `field` is not a valid path.
    pub fn get(&self, field: impl IntoFieldPath) -> Option<&FirestoreValue> {
        let path = field.into_field_path().ok()?;
        let fields = self.data.as_ref()?.fields();
        value_for_segments(fields, path.segments())
    }

    pub fn read_time(&self) -> Option<&Timestamp> {
        self.read_time.as_ref()
    }

    pub fn create_time(&self) -> Option<&Timestamp> {
        self.create_time.as_ref()
    }

    pub fn update_time(&self) -> Option<&Timestamp> {
        self.update_time.as_ref()
    }
}
