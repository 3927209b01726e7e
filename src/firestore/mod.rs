pub mod api;
mod constants;
pub mod error;
pub mod logger;
pub mod model;
pub mod remote;
pub mod value;

pub use api::{
    CollectionReference, DocumentReference, DocumentSnapshot, Firestore, FirestoreSettings, Query,
    QuerySnapshot, Reference, Transaction, WriteBatch, WriteResult,
};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
