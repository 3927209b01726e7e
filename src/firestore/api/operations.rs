use std::collections::{BTreeMap, HashSet};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath};
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// Options that configure `set` writes.
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    /// Merge the provided data into the existing document instead of replacing it.
    pub merge: bool,
    /// Explicit field mask to merge. Takes precedence over `merge`.
    pub merge_fields: Option<Vec<FieldPath>>,
}

impl SetOptions {
    /// Merges every leaf field present in the data.
    pub fn merge_all() -> Self {
        Self {
            merge: true,
            merge_fields: None,
        }
    }

    /// Merges only the listed field paths; each one must be present in the data.
    pub fn merge_fields<I>(fields: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = FieldPath>,
    {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for field in fields {
            if seen.insert(field.canonical_string()) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(invalid_argument(
                "merge_fields requires at least one field path",
            ));
        }
        Ok(Self {
            merge: false,
            merge_fields: Some(unique),
        })
    }

    pub fn is_merge(&self) -> bool {
        self.merge || self.merge_fields.is_some()
    }

    pub fn field_mask(&self) -> Option<&[FieldPath]> {
        self.merge_fields.as_deref()
    }
}

/// Describes a single field transform applied during a write.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    ServerTimestamp,
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
    NumericIncrement(FirestoreValue),
}

/// One entry of a commit request, applied by the server in submission order.
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    /// Writes the document only if it does not exist yet.
    Create {
        key: DocumentKey,
        data: MapValue,
        transforms: Vec<FieldTransform>,
    },
    /// Replaces the document, or only the masked fields when `mask` is set.
    Set {
        key: DocumentKey,
        data: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
    },
    /// Updates the masked fields of an existing document.
    Update {
        key: DocumentKey,
        data: MapValue,
        mask: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
    },
    Delete {
        key: DocumentKey,
    },
}

impl Write {
    pub fn create(key: DocumentKey, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<Self> {
        let parsed = parse_document_data(&data, false)?;
        Ok(Write::Create {
            key,
            data: MapValue::new(parsed.fields),
            transforms: parsed.transforms,
        })
    }

    pub fn set(
        key: DocumentKey,
        data: BTreeMap<String, FirestoreValue>,
        options: &SetOptions,
    ) -> FirestoreResult<Self> {
        let parsed = parse_document_data(&data, options.is_merge())?;

        let (mask, transforms) = if let Some(merge_fields) = options.field_mask() {
            for field in merge_fields {
                let present = value_for_segments(&data, field.segments()).is_some();
                if !present {
                    return Err(invalid_argument(format!(
                        "Field '{}' is specified in merge_fields but missing from the provided data",
                        field.canonical_string()
                    )));
                }
            }
            let transforms = parsed
                .transforms
                .into_iter()
                .filter(|transform| covers(merge_fields, transform.field_path()))
                .collect();
            (Some(merge_fields.to_vec()), transforms)
        } else if options.merge {
            let mut mask = collect_leaf_paths(&parsed.fields)?;
            mask.extend(parsed.deletes);
            (Some(dedupe(mask)), parsed.transforms)
        } else {
            (None, parsed.transforms)
        };

        Ok(Write::Set {
            key,
            data: MapValue::new(parsed.fields),
            mask,
            transforms,
        })
    }

    /// Builds an update from dotted field paths (`"stats.views"`) to values.
    pub fn update(key: DocumentKey, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<Self> {
        let entries = data
            .into_iter()
            .map(|(path, value)| Ok((FieldPath::from_dot_separated(&path)?, value)))
            .collect::<FirestoreResult<Vec<_>>>()?;
        Self::update_fields(key, entries)
    }

    pub fn update_fields(
        key: DocumentKey,
        entries: Vec<(FieldPath, FirestoreValue)>,
    ) -> FirestoreResult<Self> {
        if entries.is_empty() {
            return Err(invalid_argument(
                "update requires at least one field/value pair",
            ));
        }

        let mut fields = BTreeMap::new();
        let mut mask = Vec::new();
        let mut transforms = Vec::new();
        for (path, value) in entries {
            match value.kind() {
                ValueKind::Sentinel(SentinelValue::Delete) => mask.push(path),
                ValueKind::Sentinel(sentinel) => {
                    transforms.push(transform_from_sentinel(path, sentinel)?);
                }
                ValueKind::Map(map) => {
                    let mut context = ParseContext::new(false);
                    let nested = context.parse_map(map.fields(), path.segments())?;
                    transforms.extend(context.transforms);
                    set_value_at_segments(&mut fields, path.segments(), FirestoreValue::from_map(nested));
                    mask.push(path);
                }
                _ => {
                    assert_no_sentinel_in_value(&value, &path)?;
                    set_value_at_segments(&mut fields, path.segments(), value.clone());
                    mask.push(path);
                }
            }
        }

        Ok(Write::Update {
            key,
            data: MapValue::new(fields),
            mask: dedupe(mask),
            transforms,
        })
    }

    pub fn delete(key: DocumentKey) -> Self {
        Write::Delete { key }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            Write::Create { key, .. }
            | Write::Set { key, .. }
            | Write::Update { key, .. }
            | Write::Delete { key } => key,
        }
    }
}

struct ParsedData {
    fields: BTreeMap<String, FirestoreValue>,
    transforms: Vec<FieldTransform>,
    deletes: Vec<FieldPath>,
}

fn parse_document_data(
    data: &BTreeMap<String, FirestoreValue>,
    allow_delete: bool,
) -> FirestoreResult<ParsedData> {
    let mut context = ParseContext::new(allow_delete);
    let fields = context.parse_map(data, &[])?;
    Ok(ParsedData {
        fields,
        transforms: context.transforms,
        deletes: context.deletes,
    })
}

struct ParseContext {
    allow_delete: bool,
    transforms: Vec<FieldTransform>,
    deletes: Vec<FieldPath>,
}

impl ParseContext {
    fn new(allow_delete: bool) -> Self {
        Self {
            allow_delete,
            transforms: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Strips sentinels out of `data`, recording them as transforms or deletes.
    fn parse_map(
        &mut self,
        data: &BTreeMap<String, FirestoreValue>,
        parent_segments: &[String],
    ) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
        let mut cleaned = BTreeMap::new();
        for (key, value) in data {
            let mut segments = parent_segments.to_vec();
            segments.push(key.clone());
            let field_path = FieldPath::new(segments.clone())?;
            match value.kind() {
                ValueKind::Sentinel(SentinelValue::Delete) => {
                    if !self.allow_delete {
                        return Err(invalid_argument(format!(
                            "delete_field() cannot be used at '{}': only update() and merging set() accept it",
                            field_path.canonical_string()
                        )));
                    }
                    self.deletes.push(field_path);
                }
                ValueKind::Sentinel(sentinel) => {
                    self.transforms.push(transform_from_sentinel(field_path, sentinel)?);
                }
                ValueKind::Map(map) => {
                    let nested = self.parse_map(map.fields(), &segments)?;
                    let only_sentinels = nested.is_empty() && !map.fields().is_empty();
                    if !only_sentinels {
                        cleaned.insert(key.clone(), FirestoreValue::from_map(nested));
                    }
                }
                _ => {
                    assert_no_sentinel_in_value(value, &field_path)?;
                    cleaned.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(cleaned)
    }
}

fn transform_from_sentinel(
    field_path: FieldPath,
    sentinel: &SentinelValue,
) -> FirestoreResult<FieldTransform> {
    let operation = match sentinel {
        SentinelValue::ServerTimestamp => TransformOperation::ServerTimestamp,
        SentinelValue::ArrayUnion(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, &field_path)?;
            }
            TransformOperation::ArrayUnion(elements.clone())
        }
        SentinelValue::ArrayRemove(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, &field_path)?;
            }
            TransformOperation::ArrayRemove(elements.clone())
        }
        SentinelValue::NumericIncrement(operand) => match operand.kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => {
                TransformOperation::NumericIncrement(operand.as_ref().clone())
            }
            _ => {
                return Err(invalid_argument(
                    "numeric_increment() requires a numeric operand",
                ))
            }
        },
        SentinelValue::Delete => {
            return Err(invalid_argument(format!(
                "delete_field() cannot be nested at '{}'",
                field_path.canonical_string()
            )))
        }
    };
    Ok(FieldTransform::new(field_path, operation))
}

fn assert_no_sentinel_in_value(value: &FirestoreValue, context: &FieldPath) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(format!(
            "Invalid data. Sentinel values cannot be used inside arrays (field '{}').",
            context.canonical_string()
        ))),
        ValueKind::Array(array) => {
            for element in array.values() {
                assert_no_sentinel_in_value(element, context)?;
            }
            Ok(())
        }
        ValueKind::Map(map) => {
            for element in map.fields().values() {
                assert_no_sentinel_in_value(element, context)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn covers(mask: &[FieldPath], path: &FieldPath) -> bool {
    mask.iter()
        .any(|field| path.segments().starts_with(field.segments()))
}

fn dedupe(paths: Vec<FieldPath>) -> Vec<FieldPath> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.canonical_string()))
        .collect()
}

fn collect_leaf_paths(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Vec<FieldPath>> {
    let mut paths = Vec::new();
    for (key, value) in data {
        collect_paths_from_value(&mut paths, vec![key.clone()], value)?;
    }
    Ok(paths)
}

fn collect_paths_from_value(
    acc: &mut Vec<FieldPath>,
    segments: Vec<String>,
    value: &FirestoreValue,
) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Map(map) if !map.fields().is_empty() => {
            for (child_key, child_value) in map.fields() {
                let mut child_segments = segments.clone();
                child_segments.push(child_key.clone());
                collect_paths_from_value(acc, child_segments, child_value)?;
            }
            Ok(())
        }
        _ => {
            acc.push(FieldPath::new(segments)?);
            Ok(())
        }
    }
}

/// Looks up a nested value; `None` as soon as a segment is absent or not a map.
pub(crate) fn value_for_segments<'a>(
    fields: &'a BTreeMap<String, FirestoreValue>,
    segments: &[String],
) -> Option<&'a FirestoreValue> {
    let (first, rest) = segments.split_first()?;
    let value = fields.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else if let ValueKind::Map(child) = value.kind() {
        value_for_segments(child.fields(), rest)
    } else {
        None
    }
}

fn set_value_at_segments(
    fields: &mut BTreeMap<String, FirestoreValue>,
    segments: &[String],
    value: FirestoreValue,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }

    let entry = fields
        .entry(first.clone())
        .or_insert_with(|| FirestoreValue::from_map(BTreeMap::new()));
    let mut child_fields = match entry.kind() {
        ValueKind::Map(map) => map.fields().clone(),
        _ => BTreeMap::new(),
    };
    set_value_at_segments(&mut child_fields, rest, value);
    *entry = FirestoreValue::from_map(child_fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DocumentKey {
        DocumentKey::from_string("cities/sf").unwrap()
    }

    #[test]
    fn merge_masks_leaves_but_not_transforms() {
        let data = BTreeMap::from([
            ("name".to_string(), FirestoreValue::from_string("SF")),
            ("updated_at".to_string(), FirestoreValue::server_timestamp()),
        ]);
        let write = Write::set(key(), data, &SetOptions::merge_all()).unwrap();
        let Write::Set {
            mask, transforms, ..
        } = write
        else {
            panic!("expected set write");
        };
        let mask = mask.expect("mask");
        assert_eq!(mask.len(), 1);
        assert_eq!(mask[0].canonical_string(), "name");
        assert_eq!(transforms.len(), 1);
        assert_eq!(transforms[0].operation(), &TransformOperation::ServerTimestamp);
    }

    #[test]
    fn merge_fields_supports_nested_sentinel() {
        let data = BTreeMap::from([(
            "stats".to_string(),
            FirestoreValue::from_map(BTreeMap::from([(
                "last_updated".to_string(),
                FirestoreValue::server_timestamp(),
            )])),
        )]);
        let options =
            SetOptions::merge_fields(vec![FieldPath::from_dot_separated("stats.last_updated").unwrap()])
                .unwrap();
        let Write::Set {
            mask, transforms, ..
        } = Write::set(key(), data, &options).unwrap()
        else {
            panic!("expected set write");
        };
        assert_eq!(mask.unwrap().len(), 1);
        assert_eq!(transforms.len(), 1);
    }

    #[test]
    fn merge_fields_must_exist_in_data() {
        let data = BTreeMap::from([("a".to_string(), FirestoreValue::from_integer(1))]);
        let options = SetOptions::merge_fields(vec![FieldPath::from_dot_separated("b").unwrap()]).unwrap();
        let err = Write::set(key(), data, &options).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn delete_field_only_in_update_or_merge() {
        let data = BTreeMap::from([("gone".to_string(), FirestoreValue::delete_field())]);
        let err = Write::set(key(), data.clone(), &SetOptions::default()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
        let err = Write::create(key(), data.clone()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");

        let Write::Set { mask, data: fields, .. } =
            Write::set(key(), data.clone(), &SetOptions::merge_all()).unwrap()
        else {
            panic!("expected set write");
        };
        assert_eq!(mask.unwrap()[0].canonical_string(), "gone");
        assert!(fields.fields().is_empty());

        let Write::Update { mask, data: fields, .. } = Write::update(key(), data).unwrap() else {
            panic!("expected update write");
        };
        assert_eq!(mask[0].canonical_string(), "gone");
        assert!(fields.fields().is_empty());
    }

    #[test]
    fn update_expands_dotted_paths() {
        let data = BTreeMap::from([
            ("stats.views".to_string(), FirestoreValue::from_integer(3)),
            (
                "stats.likes".to_string(),
                FirestoreValue::numeric_increment(FirestoreValue::from_integer(1)),
            ),
        ]);
        let Write::Update {
            data,
            mask,
            transforms,
            ..
        } = Write::update(key(), data).unwrap()
        else {
            panic!("expected update write");
        };
        let stats = data.fields().get("stats").and_then(FirestoreValue::as_map).unwrap();
        assert_eq!(stats.fields().get("views"), Some(&FirestoreValue::from_integer(3)));
        let mask: Vec<_> = mask.iter().map(FieldPath::canonical_string).collect();
        assert_eq!(mask, ["stats.views"]);
        assert_eq!(transforms[0].field_path().canonical_string(), "stats.likes");
    }

    #[test]
    fn array_rejects_nested_sentinel() {
        let data = BTreeMap::from([(
            "values".to_string(),
            FirestoreValue::from_array(vec![FirestoreValue::server_timestamp()]),
        )]);
        let err = Write::set(key(), data, &SetOptions::default()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn increment_requires_numeric_operand() {
        let data = BTreeMap::from([(
            "total".to_string(),
            FirestoreValue::numeric_increment(FirestoreValue::from_string("five")),
        )]);
        let err = Write::update(key(), data).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = Write::update(key(), BTreeMap::new()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn looks_up_nested_values() {
        let data = BTreeMap::from([(
            "a".to_string(),
            FirestoreValue::from_map(BTreeMap::from([("b".to_string(), FirestoreValue::from_bool(true))])),
        )]);
        let path = FieldPath::from_dot_separated("a.b").unwrap();
        assert_eq!(value_for_segments(&data, path.segments()), Some(&FirestoreValue::from_bool(true)));
        let missing = FieldPath::from_dot_separated("a.b.c").unwrap();
        assert!(value_for_segments(&data, missing.segments()).is_none());
    }
}
