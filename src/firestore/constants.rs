pub(crate) const DEFAULT_DATABASE_ID: &str = "(default)";

pub(crate) const FIRESTORE_API_HOST: &str = "https://firestore.googleapis.com";
pub(crate) const FIRESTORE_API_VERSION: &str = "v1";

/// Environment variable consulted for an emulator `host:port` when none is configured.
pub(crate) const FIRESTORE_EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

pub(crate) const MAX_BATCH_WRITES: usize = 500;

/// Length of identifiers generated by `CollectionReference::doc(None)`.
pub(crate) const AUTO_ID_LENGTH: usize = 20;

/// Page size used by `listCollectionIds` and `list_documents`.
pub(crate) const MAX_PAGE_SIZE: u32 = i32::MAX as u32;
