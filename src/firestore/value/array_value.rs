use crate::firestore::value::FirestoreValue;

/// Ordered list of values stored in an `arrayValue`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayValue {
    values: Vec<FirestoreValue>,
}

impl ArrayValue {
    pub fn new(values: Vec<FirestoreValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FirestoreValue> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<FirestoreValue> {
        self.values
    }
}

impl FromIterator<FirestoreValue> for ArrayValue {
    fn from_iter<I: IntoIterator<Item = FirestoreValue>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ArrayValue {
    type Item = &'a FirestoreValue;
    type IntoIter = std::slice::Iter<'a, FirestoreValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
