mod database;
pub(crate) mod operations;
pub(crate) mod query;
mod reference;
mod snapshot;
mod transaction;
mod write_batch;

pub use database::{Firestore, FirestoreSettings, WriteResult};
pub use operations::{FieldTransform, SetOptions, TransformOperation, Write};
pub use query::{
    Bound, CursorSource, Filter, FilterOperator, OrderBy, OrderDirection, Query, QuerySnapshot,
    QueryState, UnaryOperator,
};
pub use reference::{CollectionReference, DocumentReference, Reference};
pub use snapshot::DocumentSnapshot;
pub use transaction::Transaction;
pub use write_batch::WriteBatch;
