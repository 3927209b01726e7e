use std::collections::BTreeMap;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{json, Value as JsonValue};

use crate::firestore::api::operations::{FieldTransform, TransformOperation, Write};
use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};
use crate::firestore::model::{DatabaseId, DocumentKey, FieldPath, GeoPoint, ResourcePath, Timestamp};
use crate::firestore::value::{BytesValue, FirestoreValue, MapValue, ValueKind};

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A document as returned by `batchGet`, `runQuery` and `listDocuments`.
#[derive(Clone, Debug)]
pub struct DecodedDocument {
    pub path: ResourcePath,
    pub fields: MapValue,
    pub create_time: Option<Timestamp>,
    pub update_time: Option<Timestamp>,
}

/// Converts between the crate's model types and the Firestore v1 JSON encoding.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    database_id: DatabaseId,
}

impl JsonProtoSerializer {
    pub fn new(database_id: DatabaseId) -> Self {
        Self { database_id }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn database_name(&self) -> String {
        self.database_id.database_name()
    }

    pub fn document_name(&self, key: &DocumentKey) -> String {
        self.database_id.qualified_path(key.path())
    }

    /// Strips the `projects/{p}/databases/{d}/documents` prefix from a resource name.
    pub fn decode_resource_name(&self, name: &str) -> FirestoreResult<ResourcePath> {
        let prefix = format!("{}/documents", self.database_name());
        let relative = name
            .strip_prefix(&prefix)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| {
                internal_error(format!(
                    "Resource name '{name}' does not belong to database '{}'",
                    self.database_name()
                ))
            })?;
        Ok(ResourcePath::from_string(relative))
    }

    /// `documents` or `documents/{segment}/...` with every segment percent-encoded,
    /// suitable for appending to the database URL.
    pub fn relative_document_path(&self, path: &ResourcePath) -> String {
        let mut relative = String::from("documents");
        for segment in path.iter() {
            relative.push('/');
            relative.extend(utf8_percent_encode(segment, PATH_SEGMENT));
        }
        relative
    }

    /// Reference value pointing at `path`, in the fully qualified wire form.
    pub fn reference_value(&self, path: &ResourcePath) -> FirestoreValue {
        FirestoreValue::from_reference(self.database_id.qualified_path(path))
    }

    pub fn encode_value(&self, value: &FirestoreValue) -> FirestoreResult<JsonValue> {
        encode_value(value)
    }

    pub fn encode_fields(&self, map: &MapValue) -> FirestoreResult<JsonValue> {
        encode_map_fields(map)
    }

    pub fn decode_value(&self, value: &JsonValue) -> FirestoreResult<FirestoreValue> {
        decode_value(value)
    }

    /// Decodes the `fields` of a document object; a document without fields is empty.
    pub fn decode_fields(&self, document: &JsonValue) -> FirestoreResult<MapValue> {
        decode_map_value(document)
    }

    pub fn decode_document(&self, document: &JsonValue) -> FirestoreResult<DecodedDocument> {
        let name = document
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| internal_error("Document is missing its 'name'"))?;
        Ok(DecodedDocument {
            path: self.decode_resource_name(name)?,
            fields: self.decode_fields(document)?,
            create_time: decode_timestamp_field(document, "createTime")?,
            update_time: decode_timestamp_field(document, "updateTime")?,
        })
    }

    /// Reads an optional RFC 3339 timestamp stored under `field`.
    pub fn decode_timestamp(&self, value: &JsonValue, field: &str) -> FirestoreResult<Option<Timestamp>> {
        decode_timestamp_field(value, field)
    }

    pub fn encode_write(&self, write: &Write) -> FirestoreResult<JsonValue> {
        match write {
            Write::Create {
                key,
                data,
                transforms,
            } => {
                let mut encoded = self.build_update_write_map(key, data, transforms)?;
                encoded.insert("currentDocument".to_string(), json!({ "exists": false }));
                Ok(JsonValue::Object(encoded))
            }
            Write::Set {
                key,
                data,
                mask,
                transforms,
            } => {
                let mut encoded = self.build_update_write_map(key, data, transforms)?;
                if let Some(mask) = mask {
                    encoded.insert("updateMask".to_string(), encode_mask(mask));
                }
                Ok(JsonValue::Object(encoded))
            }
            Write::Update {
                key,
                data,
                mask,
                transforms,
            } => {
                let mut encoded = self.build_update_write_map(key, data, transforms)?;
                encoded.insert("updateMask".to_string(), encode_mask(mask));
                encoded.insert("currentDocument".to_string(), json!({ "exists": true }));
                Ok(JsonValue::Object(encoded))
            }
            Write::Delete { key } => Ok(json!({ "delete": self.document_name(key) })),
        }
    }

    fn build_update_write_map(
        &self,
        key: &DocumentKey,
        map: &MapValue,
        transforms: &[FieldTransform],
    ) -> FirestoreResult<serde_json::Map<String, JsonValue>> {
        let mut write = serde_json::Map::new();
        write.insert(
            "update".to_string(),
            json!({
                "name": self.document_name(key),
                "fields": encode_map_fields(map)?
            }),
        );
        if !transforms.is_empty() {
            let encoded = transforms
                .iter()
                .map(encode_field_transform)
                .collect::<FirestoreResult<Vec<_>>>()?;
            write.insert("updateTransforms".to_string(), JsonValue::Array(encoded));
        }
        Ok(write)
    }
}

fn encode_mask(mask: &[FieldPath]) -> JsonValue {
    let paths: Vec<String> = mask.iter().map(FieldPath::canonical_string).collect();
    json!({ "fieldPaths": paths })
}

fn encode_field_transform(transform: &FieldTransform) -> FirestoreResult<JsonValue> {
    let field_path = transform.field_path().canonical_string();
    let encoded = match transform.operation() {
        TransformOperation::ServerTimestamp => json!({
            "fieldPath": field_path,
            "setToServerValue": "REQUEST_TIME"
        }),
        TransformOperation::ArrayUnion(elements) => json!({
            "fieldPath": field_path,
            "appendMissingElements": { "values": encode_values(elements)? }
        }),
        TransformOperation::ArrayRemove(elements) => json!({
            "fieldPath": field_path,
            "removeAllFromArray": { "values": encode_values(elements)? }
        }),
        TransformOperation::NumericIncrement(operand) => json!({
            "fieldPath": field_path,
            "increment": encode_value(operand)?
        }),
    };
    Ok(encoded)
}

fn encode_values(values: &[FirestoreValue]) -> FirestoreResult<Vec<JsonValue>> {
    values.iter().map(encode_value).collect()
}

fn encode_map_fields(map: &MapValue) -> FirestoreResult<JsonValue> {
    let mut fields = serde_json::Map::new();
    for (key, value) in map.fields() {
        fields.insert(key.clone(), encode_value(value)?);
    }
    Ok(JsonValue::Object(fields))
}

fn encode_value(value: &FirestoreValue) -> FirestoreResult<JsonValue> {
    let encoded = match value.kind() {
        ValueKind::Null => json!({ "nullValue": JsonValue::Null }),
        ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
        ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
        ValueKind::Double(double) => encode_double(*double),
        ValueKind::Timestamp(timestamp) => json!({ "timestampValue": timestamp.to_rfc3339()? }),
        ValueKind::String(string) => json!({ "stringValue": string }),
        ValueKind::Bytes(bytes) => {
            json!({ "bytesValue": bytes.to_base64() })
        }
        ValueKind::Reference(reference) => json!({ "referenceValue": reference }),
        ValueKind::GeoPoint(point) => json!({
            "geoPointValue": {
                "latitude": point.latitude(),
                "longitude": point.longitude(),
            }
        }),
        ValueKind::Array(array) => {
            json!({ "arrayValue": { "values": encode_values(array.values())? } })
        }
        ValueKind::Map(map) => json!({
            "mapValue": {
                "fields": encode_map_fields(map)?
            }
        }),
        ValueKind::Sentinel(_) => {
            return Err(invalid_argument(
                "Sentinel values can only be used as top-level write data",
            ))
        }
    };
    Ok(encoded)
}

// JSON has no literal for NaN or the infinities; the REST API accepts them as strings.
fn encode_double(value: f64) -> JsonValue {
    if value.is_nan() {
        json!({ "doubleValue": "NaN" })
    } else if value.is_infinite() {
        let literal = if value > 0.0 { "Infinity" } else { "-Infinity" };
        json!({ "doubleValue": literal })
    } else {
        json!({ "doubleValue": value })
    }
}

fn decode_map_value(value: &JsonValue) -> FirestoreResult<MapValue> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected object for map value"))?;
    let fields_object = match map.get("fields") {
        Some(fields_value) => fields_value
            .as_object()
            .ok_or_else(|| invalid_argument("Expected 'fields' to be an object"))?,
        None => return Ok(MapValue::new(BTreeMap::new())),
    };

    let mut fields = BTreeMap::new();
    for (key, value) in fields_object {
        fields.insert(key.clone(), decode_value(value)?);
    }
    Ok(MapValue::new(fields))
}

fn decode_value(value: &JsonValue) -> FirestoreResult<FirestoreValue> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected Firestore value object"))?;
    if object.contains_key("nullValue") {
        return Ok(FirestoreValue::null());
    }
    if let Some(bool_value) = object.get("booleanValue") {
        let value = bool_value
            .as_bool()
            .ok_or_else(|| invalid_argument("booleanValue must be bool"))?;
        return Ok(FirestoreValue::from_bool(value));
    }
    if let Some(integer_value) = object.get("integerValue") {
        let parsed = match integer_value {
            JsonValue::String(value) => i64::from_str(value)
                .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
            JsonValue::Number(number) => number
                .as_i64()
                .ok_or_else(|| invalid_argument("Integer out of range"))?,
            _ => return Err(invalid_argument("integerValue must be a string or number")),
        };
        return Ok(FirestoreValue::from_integer(parsed));
    }
    if let Some(double_value) = object.get("doubleValue") {
        let parsed = match double_value {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| invalid_argument("Invalid doubleValue"))?,
            JsonValue::String(value) => match value.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other
                    .parse::<f64>()
                    .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}")))?,
            },
            _ => return Err(invalid_argument("doubleValue must be a number or string")),
        };
        return Ok(FirestoreValue::from_double(parsed));
    }
    if let Some(timestamp_value) = object.get("timestampValue") {
        let timestamp_str = timestamp_value
            .as_str()
            .ok_or_else(|| invalid_argument("timestampValue must be string"))?;
        return Ok(FirestoreValue::from_timestamp(Timestamp::parse_rfc3339(
            timestamp_str,
        )?));
    }
    if let Some(string_value) = object.get("stringValue") {
        let str_value = string_value
            .as_str()
            .ok_or_else(|| invalid_argument("stringValue must be string"))?;
        return Ok(FirestoreValue::from_string(str_value));
    }
    if let Some(bytes_value) = object.get("bytesValue") {
        let str_value = bytes_value
            .as_str()
            .ok_or_else(|| invalid_argument("bytesValue must be base64 string"))?;
        return Ok(FirestoreValue::from_bytes(BytesValue::from_base64(str_value)?));
    }
    if let Some(reference_value) = object.get("referenceValue") {
        let str_value = reference_value
            .as_str()
            .ok_or_else(|| invalid_argument("referenceValue must be string"))?;
        return Ok(FirestoreValue::from_reference(str_value));
    }
    if let Some(geo_point) = object.get("geoPointValue") {
        // Zero coordinates are omitted from the JSON encoding.
        let latitude = geo_point.get("latitude").and_then(JsonValue::as_f64).unwrap_or(0.0);
        let longitude = geo_point.get("longitude").and_then(JsonValue::as_f64).unwrap_or(0.0);
        return Ok(FirestoreValue::from_geo_point(GeoPoint::new(
            latitude, longitude,
        )?));
    }
    if let Some(array_value) = object.get("arrayValue") {
        let decoded = match array_value.get("values").and_then(JsonValue::as_array) {
            Some(entries) => entries
                .iter()
                .map(decode_value)
                .collect::<FirestoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        return Ok(FirestoreValue::from_array(decoded));
    }
    if let Some(map_value) = object.get("mapValue") {
        let map = decode_map_value(map_value)?;
        return Ok(FirestoreValue::from_map(map.fields().clone()));
    }

    let tag = object.keys().next().map(String::as_str).unwrap_or("<empty>");
    Err(invalid_argument(format!("Unknown Firestore value type '{tag}'")))
}

fn decode_timestamp_field(value: &JsonValue, field: &str) -> FirestoreResult<Option<Timestamp>> {
    match value.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(text)) => Timestamp::parse_rfc3339(text).map(Some),
        Some(_) => Err(internal_error(format!("'{field}' must be an RFC 3339 string"))),
    }
}
