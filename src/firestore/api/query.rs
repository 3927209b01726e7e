use std::fmt::{Display, Formatter};
use std::str::FromStr;

use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::firestore::error::{internal_error, invalid_argument, FirestoreError, FirestoreResult};
use crate::firestore::model::{FieldPath, IntoFieldPath, ResourcePath, Timestamp};
use crate::firestore::remote::rpc_error::map_error_payload;
use crate::firestore::remote::structured_query::encode_structured_query;
use crate::firestore::value::{FirestoreValue, ValueKind};

use super::reference::{CollectionReference, DocumentReference};
use super::snapshot::DocumentSnapshot;
use super::Firestore;

/// Comparison operators accepted by [`Query::where_field`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Wire name used in `fieldFilter.op`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }

    /// Range comparisons that force an implicit leading `orderBy`.
    pub fn is_inequality(&self) -> bool {
        matches!(
            self,
            FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
        )
    }

    fn takes_array_operand(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::ArrayContainsAny
        )
    }
}

impl FromStr for FilterOperator {
    type Err = FirestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(FilterOperator::LessThan),
            "<=" => Ok(FilterOperator::LessThanOrEqual),
            ">" => Ok(FilterOperator::GreaterThan),
            ">=" => Ok(FilterOperator::GreaterThanOrEqual),
            "==" => Ok(FilterOperator::Equal),
            "!=" => Ok(FilterOperator::NotEqual),
            "array-contains" => Ok(FilterOperator::ArrayContains),
            "array-contains-any" => Ok(FilterOperator::ArrayContainsAny),
            "in" => Ok(FilterOperator::In),
            "not-in" => Ok(FilterOperator::NotIn),
            other => Err(invalid_argument(format!(
                "Invalid query. Unsupported filter operator '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    IsNull,
    IsNotNull,
    IsNan,
    IsNotNan,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::IsNull => "IS_NULL",
            UnaryOperator::IsNotNull => "IS_NOT_NULL",
            UnaryOperator::IsNan => "IS_NAN",
            UnaryOperator::IsNotNan => "IS_NOT_NAN",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }

    pub fn flip(self) -> Self {
        match self {
            OrderDirection::Ascending => OrderDirection::Descending,
            OrderDirection::Descending => OrderDirection::Ascending,
        }
    }
}

impl FromStr for OrderDirection {
    type Err = FirestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(OrderDirection::Ascending),
            "desc" | "descending" => Ok(OrderDirection::Descending),
            other => Err(invalid_argument(format!(
                "Invalid query. Unsupported order direction '{other}'"
            ))),
        }
    }
}

/// One accumulated `where` clause. All clauses of a query are AND-ed.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field {
        field: FieldPath,
        op: FilterOperator,
        value: FirestoreValue,
    },
    Unary {
        field: FieldPath,
        op: UnaryOperator,
    },
}

impl Filter {
    pub fn field(&self) -> &FieldPath {
        match self {
            Filter::Field { field, .. } | Filter::Unary { field, .. } => field,
        }
    }

    fn is_inequality(&self) -> bool {
        matches!(self, Filter::Field { op, .. } if op.is_inequality())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    fn flipped(&self) -> Self {
        Self::new(self.field.clone(), self.direction.flip())
    }
}

/// A cursor position. `before` places the cursor just before the listed
/// values, so it is inclusive for a start bound and exclusive for an end bound.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    values: Vec<FirestoreValue>,
    before: bool,
}

impl Bound {
    pub fn new(values: Vec<FirestoreValue>, before: bool) -> Self {
        Self { values, before }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn before(&self) -> bool {
        self.before
    }
}

/// Input accepted by the cursor methods: literal values, one per `orderBy`
/// clause, or a snapshot whose fields supply them.
#[derive(Clone, Debug)]
pub enum CursorSource {
    Values(Vec<FirestoreValue>),
    Snapshot(DocumentSnapshot),
}

impl From<Vec<FirestoreValue>> for CursorSource {
    fn from(values: Vec<FirestoreValue>) -> Self {
        CursorSource::Values(values)
    }
}

impl From<DocumentSnapshot> for CursorSource {
    fn from(snapshot: DocumentSnapshot) -> Self {
        CursorSource::Snapshot(snapshot)
    }
}

impl From<&DocumentSnapshot> for CursorSource {
    fn from(snapshot: &DocumentSnapshot) -> Self {
        CursorSource::Snapshot(snapshot.clone())
    }
}

/// Everything a query accumulates. Builders on [`Query`] never modify a state
/// in place; each returns a query holding a fresh copy.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryState {
    collection_path: ResourcePath,
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
    projection: Option<Vec<FieldPath>>,
    limit: Option<u32>,
    offset: Option<u32>,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
    limit_to_last: bool,
}

impl QueryState {
    fn new(collection_path: ResourcePath) -> Self {
        Self {
            collection_path,
            filters: Vec::new(),
            order_by: Vec::new(),
            projection: None,
            limit: None,
            offset: None,
            start_at: None,
            end_at: None,
            limit_to_last: false,
        }
    }

    pub fn collection_path(&self) -> &ResourcePath {
        &self.collection_path
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The `orderBy` clauses added explicitly, in call order.
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn projection(&self) -> Option<&[FieldPath]> {
        self.projection.as_deref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub fn is_limit_to_last(&self) -> bool {
        self.limit_to_last
    }

    /// Explicit ordering completed to a total order: a lone inequality field
    /// leads when nothing was ordered explicitly, and the document name always
    /// ends the list.
    pub fn effective_order_by(&self) -> Vec<OrderBy> {
        let mut orders = self.order_by.clone();
        if orders.is_empty() {
            if let Some(filter) = self.filters.iter().find(|filter| filter.is_inequality()) {
                orders.push(OrderBy::new(filter.field().clone(), OrderDirection::Ascending));
            }
        }
        if !orders.iter().any(|order| order.field.is_document_id()) {
            let direction = orders.last().map(OrderBy::direction).unwrap_or_default();
            orders.push(OrderBy::new(FieldPath::document_id(), direction));
        }
        orders
    }

    /// The state actually sent to the backend. A limit-to-last query becomes a
    /// plain limit over the flipped ordering with swapped cursors.
    pub(crate) fn to_request(&self) -> FirestoreResult<QueryState> {
        let mut request = self.clone();
        if !self.limit_to_last {
            request.order_by = self.effective_order_by();
            return Ok(request);
        }
        if self.order_by.is_empty() {
            return Err(invalid_argument(
                "limitToLast() queries require specifying at least one orderBy() clause",
            ));
        }
        request.order_by = self
            .effective_order_by()
            .iter()
            .map(OrderBy::flipped)
            .collect();
        request.start_at = self
            .end_at
            .as_ref()
            .map(|bound| Bound::new(bound.values.clone(), !bound.before));
        request.end_at = self
            .start_at
            .as_ref()
            .map(|bound| Bound::new(bound.values.clone(), !bound.before));
        Ok(request)
    }
}

/// An immutable query over one collection.
#[derive(Clone, Debug)]
pub struct Query {
    collection: CollectionReference,
    state: QueryState,
}

impl Query {
    pub(crate) fn new(collection: CollectionReference) -> Self {
        let state = QueryState::new(collection.resource_path().clone());
        Self { collection, state }
    }

    pub fn firestore(&self) -> &Firestore {
        self.collection.firestore()
    }

    /// The collection every document id and snapshot is resolved against.
    pub fn collection(&self) -> &CollectionReference {
        &self.collection
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    fn with_state(&self, state: QueryState) -> Self {
        Self {
            collection: self.collection.clone(),
            state,
        }
    }

    /// Adds a filter. `null` and `NaN` operands compile to unary filters and
    /// only support `==` and `!=`.
    pub fn where_field(
        &self,
        field: impl IntoFieldPath,
        op: FilterOperator,
        value: impl Into<FirestoreValue>,
    ) -> FirestoreResult<Query> {
        let field = field.into_field_path()?;
        let value = value.into();
        if value.is_sentinel() {
            return Err(invalid_argument(format!(
                "Function where() called with invalid data. Field transforms cannot be used as a filter value (found in field {})",
                field.canonical_string()
            )));
        }

        let filter = if value.is_null() || value.is_nan() {
            let op = match (op, value.is_null()) {
                (FilterOperator::Equal, true) => UnaryOperator::IsNull,
                (FilterOperator::NotEqual, true) => UnaryOperator::IsNotNull,
                (FilterOperator::Equal, false) => UnaryOperator::IsNan,
                (FilterOperator::NotEqual, false) => UnaryOperator::IsNotNan,
                _ => {
                    return Err(invalid_argument(
                        "Invalid query. Null and NaN only support '==' and '!=' comparisons.",
                    ))
                }
            };
            Filter::Unary { field, op }
        } else {
            if op.takes_array_operand() {
                validate_array_operand(op, &value)?;
            }
            let value = if field.is_document_id() {
                self.resolve_document_id_operand(op, value)?
            } else {
                value
            };
            Filter::Field { field, op, value }
        };

        let mut state = self.state.clone();
        state.filters.push(filter);
        Ok(self.with_state(state))
    }

    pub fn order_by(
        &self,
        field: impl IntoFieldPath,
        direction: OrderDirection,
    ) -> FirestoreResult<Query> {
        if self.state.start_at.is_some() || self.state.end_at.is_some() {
            return Err(invalid_argument(
                "Invalid query. You must not call startAt(), startAfter(), endAt() or endBefore() before calling orderBy().",
            ));
        }
        let field = field.into_field_path()?;
        let mut state = self.state.clone();
        state.order_by.push(OrderBy::new(field, direction));
        Ok(self.with_state(state))
    }

    /// Replaces the projection. An empty list projects only the document name.
    pub fn select<I, F>(&self, fields: I) -> FirestoreResult<Query>
    where
        I: IntoIterator<Item = F>,
        F: IntoFieldPath,
    {
        let mut projection = fields
            .into_iter()
            .map(IntoFieldPath::into_field_path)
            .collect::<FirestoreResult<Vec<_>>>()?;
        if projection.is_empty() {
            projection.push(FieldPath::document_id());
        }
        let mut state = self.state.clone();
        state.projection = Some(projection);
        Ok(self.with_state(state))
    }

    pub fn limit(&self, limit: u32) -> Query {
        let mut state = self.state.clone();
        state.limit = Some(limit);
        state.limit_to_last = false;
        self.with_state(state)
    }

    /// Returns the last `limit` documents of the requested ordering. Requires
    /// at least one explicit `orderBy`, checked when the query runs.
    pub fn limit_to_last(&self, limit: u32) -> Query {
        let mut state = self.state.clone();
        state.limit = Some(limit);
        state.limit_to_last = true;
        self.with_state(state)
    }

    pub fn offset(&self, offset: u32) -> Query {
        let mut state = self.state.clone();
        state.offset = Some(offset);
        self.with_state(state)
    }

    pub fn start_at(&self, source: impl Into<CursorSource>) -> FirestoreResult<Query> {
        self.with_bound("startAt", source.into(), true, true)
    }

    pub fn start_after(&self, source: impl Into<CursorSource>) -> FirestoreResult<Query> {
        self.with_bound("startAfter", source.into(), false, true)
    }

    pub fn end_at(&self, source: impl Into<CursorSource>) -> FirestoreResult<Query> {
        self.with_bound("endAt", source.into(), false, false)
    }

    pub fn end_before(&self, source: impl Into<CursorSource>) -> FirestoreResult<Query> {
        self.with_bound("endBefore", source.into(), true, false)
    }

    fn with_bound(
        &self,
        method: &str,
        source: CursorSource,
        before: bool,
        is_start: bool,
    ) -> FirestoreResult<Query> {
        let values = match source {
            CursorSource::Values(values) => self.cursor_from_values(method, values)?,
            CursorSource::Snapshot(snapshot) => self.cursor_from_snapshot(method, &snapshot)?,
        };
        let bound = Bound::new(values, before);
        let mut state = self.state.clone();
        if is_start {
            state.start_at = Some(bound);
        } else {
            state.end_at = Some(bound);
        }
        Ok(self.with_state(state))
    }

    fn cursor_from_values(
        &self,
        method: &str,
        values: Vec<FirestoreValue>,
    ) -> FirestoreResult<Vec<FirestoreValue>> {
        if values.len() > self.state.order_by.len() {
            return Err(invalid_argument(format!(
                "Too many arguments provided to {method}(). The number of arguments must be less than or equal to the number of orderBy() clauses"
            )));
        }
        values
            .into_iter()
            .zip(self.state.order_by.iter())
            .map(|(value, order)| {
                if value.is_sentinel() {
                    return Err(invalid_argument(format!(
                        "Function {method}() called with invalid data. Field transforms cannot be used as cursor values"
                    )));
                }
                if order.field.is_document_id() {
                    self.resolve_document_id(value)
                } else {
                    Ok(value)
                }
            })
            .collect()
    }

    fn cursor_from_snapshot(
        &self,
        method: &str,
        snapshot: &DocumentSnapshot,
    ) -> FirestoreResult<Vec<FirestoreValue>> {
        if !snapshot.exists() {
            return Err(invalid_argument(format!(
                "Can't use a DocumentSnapshot that doesn't exist for {method}()."
            )));
        }
        let serializer = self.firestore().serializer();
        self.state
            .effective_order_by()
            .iter()
            .map(|order| {
                if order.field.is_document_id() {
                    return Ok(serializer.reference_value(snapshot.reference().resource_path()));
                }
                snapshot.get(&order.field).cloned().ok_or_else(|| {
                    invalid_argument(format!(
                        "Invalid query. You are trying to start or end a query using a document for which the field '{}' (used as the orderBy) does not exist.",
                        order.field.canonical_string()
                    ))
                })
            })
            .collect()
    }

    fn resolve_document_id_operand(
        &self,
        op: FilterOperator,
        value: FirestoreValue,
    ) -> FirestoreResult<FirestoreValue> {
        match op {
            FilterOperator::ArrayContains | FilterOperator::ArrayContainsAny => {
                Err(invalid_argument(format!(
                    "Invalid query. You can't perform '{}' queries on documentId().",
                    op.as_str()
                )))
            }
            FilterOperator::In | FilterOperator::NotIn => {
                let elements = value
                    .as_array()
                    .map(|array| array.values().to_vec())
                    .unwrap_or_default();
                let resolved = elements
                    .into_iter()
                    .map(|element| self.resolve_document_id(element))
                    .collect::<FirestoreResult<Vec<_>>>()?;
                Ok(FirestoreValue::from_array(resolved))
            }
            _ => self.resolve_document_id(value),
        }
    }

    /// Turns a plain document id into a reference value under the anchor collection.
    fn resolve_document_id(&self, value: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        if matches!(value.kind(), ValueKind::Reference(_)) {
            return Ok(value);
        }
        let id = value.as_str().ok_or_else(|| {
            invalid_argument(
                "Invalid query. When querying with documentId(), you must provide a valid string or a DocumentReference.",
            )
        })?;
        if id.is_empty() {
            return Err(invalid_argument(
                "Invalid query. When querying with documentId(), you must provide a valid document ID, but it was an empty string.",
            ));
        }
        if id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid query. When querying a collection by documentId(), you must provide a plain document ID, but '{id}' contains a '/' character."
            )));
        }
        let path = self.collection.resource_path().child([id]);
        Ok(self.firestore().serializer().reference_value(&path))
    }

    pub(crate) fn encode_request(&self) -> FirestoreResult<JsonValue> {
        let request = self.state.to_request()?;
        encode_structured_query(self.firestore().serializer(), &request)
    }

    /// Runs the query with one `runQuery` request, inside the active
    /// transaction if there is one.
    pub async fn get(&self) -> FirestoreResult<QuerySnapshot> {
        let structured_query = self.encode_request()?;
        let firestore = self.firestore();
        let serializer = firestore.serializer();

        let parent = self.collection.resource_path().without_last();
        let path = format!("{}:runQuery", serializer.relative_document_path(&parent));
        let mut body = json!({ "structuredQuery": structured_query });
        if let Some(token) = firestore.transaction_token() {
            body["transaction"] = JsonValue::String(token);
        }

        let response = firestore.invoke(Method::POST, &path, &[], Some(body)).await?;
        let entries = match response {
            JsonValue::Array(entries) => entries,
            JsonValue::Null => Vec::new(),
            single @ JsonValue::Object(_) => vec![single],
            _ => return Err(internal_error("runQuery returned an unexpected payload")),
        };

        let mut documents = Vec::new();
        let mut read_time: Option<Timestamp> = None;
        for entry in &entries {
            if let Some(error) = entry.get("error") {
                return Err(map_error_payload(200, error));
            }
            let entry_read_time = serializer.decode_timestamp(entry, "readTime")?;
            read_time = read_time.max(entry_read_time);
            if let Some(document) = entry.get("document") {
                let decoded = serializer.decode_document(document)?;
                let reference = DocumentReference::new(firestore.clone(), decoded.path.clone())?;
                documents.push(DocumentSnapshot::found(reference, decoded, entry_read_time));
            }
        }
        if self.state.limit_to_last {
            documents.reverse();
        }
        Ok(QuerySnapshot::new(self.clone(), documents, read_time))
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Query({})", self.collection.path())
    }
}

fn validate_array_operand(op: FilterOperator, value: &FirestoreValue) -> FirestoreResult<()> {
    match value.as_array() {
        Some(array) if !array.values().is_empty() => Ok(()),
        _ => Err(invalid_argument(format!(
            "Invalid query. A non-empty array is required for '{}' filters.",
            op.as_str()
        ))),
    }
}

/// The documents returned by one query execution, in result order.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<DocumentSnapshot>,
    read_time: Option<Timestamp>,
}

impl QuerySnapshot {
    pub(crate) fn new(
        query: Query,
        documents: Vec<DocumentSnapshot>,
        read_time: Option<Timestamp>,
    ) -> Self {
        Self {
            query,
            documents,
            read_time,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Latest `readTime` reported in the response.
    pub fn read_time(&self) -> Option<&Timestamp> {
        self.read_time.as_ref()
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot> {
        self.documents.iter()
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&DocumentSnapshot),
    {
        self.documents.iter().for_each(f);
    }

    pub fn into_documents(self) -> Vec<DocumentSnapshot> {
        self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
