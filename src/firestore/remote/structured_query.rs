use serde_json::{json, Value as JsonValue};

use crate::firestore::api::query::{Bound, Filter, QueryState};
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::FieldPath;
use crate::firestore::remote::serializer::JsonProtoSerializer;

/// Encodes a request-ready state (see `QueryState::to_request`) as a
/// `StructuredQuery` object.
pub(crate) fn encode_structured_query(
    serializer: &JsonProtoSerializer,
    state: &QueryState,
) -> FirestoreResult<JsonValue> {
    let mut structured = serde_json::Map::new();

    if let Some(fields) = state.projection() {
        let field_entries: Vec<_> = fields.iter().map(field_reference).collect();
        structured.insert("select".to_string(), json!({ "fields": field_entries }));
    }

    let collection_id = state
        .collection_path()
        .last_segment()
        .ok_or_else(|| invalid_argument("Queries must target a collection"))?;
    structured.insert(
        "from".to_string(),
        json!([{ "collectionId": collection_id, "allDescendants": false }]),
    );

    if !state.filters().is_empty() {
        let filter_json = encode_filters(serializer, state.filters())?;
        structured.insert("where".to_string(), filter_json);
    }

    if !state.order_by().is_empty() {
        let orders: Vec<_> = state
            .order_by()
            .iter()
            .map(|order| {
                json!({
                    "field": field_reference(order.field()),
                    "direction": order.direction().as_str(),
                })
            })
            .collect();
        structured.insert("orderBy".to_string(), JsonValue::Array(orders));
    }

    if let Some(start) = state.start_at() {
        structured.insert("startAt".to_string(), encode_cursor(serializer, start)?);
    }

    if let Some(end) = state.end_at() {
        structured.insert("endAt".to_string(), encode_cursor(serializer, end)?);
    }

    if let Some(offset) = state.offset() {
        structured.insert("offset".to_string(), json!(offset));
    }

    if let Some(limit) = state.limit() {
        structured.insert("limit".to_string(), json!(limit));
    }

    Ok(JsonValue::Object(structured))
}

fn field_reference(field: &FieldPath) -> JsonValue {
    json!({ "fieldPath": field.canonical_string() })
}

fn encode_filters(serializer: &JsonProtoSerializer, filters: &[Filter]) -> FirestoreResult<JsonValue> {
    if let [filter] = filters {
        return encode_filter(serializer, filter);
    }

    let nested = filters
        .iter()
        .map(|filter| encode_filter(serializer, filter))
        .collect::<FirestoreResult<Vec<_>>>()?;

    Ok(json!({
        "compositeFilter": {
            "op": "AND",
            "filters": nested
        }
    }))
}

fn encode_filter(serializer: &JsonProtoSerializer, filter: &Filter) -> FirestoreResult<JsonValue> {
    match filter {
        Filter::Field { field, op, value } => Ok(json!({
            "fieldFilter": {
                "field": field_reference(field),
                "op": op.as_str(),
                "value": serializer.encode_value(value)?
            }
        })),
        Filter::Unary { field, op } => Ok(json!({
            "unaryFilter": {
                "op": op.as_str(),
                "field": field_reference(field)
            }
        })),
    }
}

fn encode_cursor(serializer: &JsonProtoSerializer, bound: &Bound) -> FirestoreResult<JsonValue> {
    let values = bound
        .values()
        .iter()
        .map(|value| serializer.encode_value(value))
        .collect::<FirestoreResult<Vec<_>>>()?;
    Ok(json!({ "values": values, "before": bound.before() }))
}
