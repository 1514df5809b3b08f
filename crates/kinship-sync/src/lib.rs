//! kinship-sync: Relationship sync coordinator for a vault of contact notes.
//!
//! Listens for document events, serializes work per document, debounces
//! markdown edits, and keeps RELATED front-matter fields, Related sections
//! and the in-memory contact graph in agreement.

pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod lock;
pub mod merge;
pub mod record;
pub mod result;
pub mod store;

pub use coordinator::SyncCoordinator;
pub use debounce::Debouncer;
pub use error::{StoreError, SyncError};
pub use lock::{LockGuard, LockRegistry};
pub use record::{JsonRecordCodec, RecordCodec, RecordError};
pub use result::SyncResult;
pub use store::{DocumentMeta, DocumentStore, FsStore, MemoryStore};
