use std::collections::BTreeMap;

use crate::firestore::value::FirestoreValue;

/// Field name to value mapping, used for document bodies and `mapValue`.
/// Keys iterate in sorted order so encoded documents are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: BTreeMap<String, FirestoreValue>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, FirestoreValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FirestoreValue> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> BTreeMap<String, FirestoreValue> {
        self.fields
    }
}

impl<K: Into<String>> FromIterator<(K, FirestoreValue)> for MapValue {
    fn from_iter<I: IntoIterator<Item = (K, FirestoreValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_top_level_keys() {
        let map: MapValue = [("city", FirestoreValue::from("SF"))].into_iter().collect();
        assert_eq!(map.get("city").and_then(FirestoreValue::as_str), Some("SF"));
        assert!(map.get("city.name").is_none());
        assert!(!map.is_empty());
    }
}
