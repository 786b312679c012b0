//! Date-partitioned storage for uploaded audio blobs.
//!
//! Blobs live under a single root as `YYYY/MM/DD/<uuid>.<ext>` and are
//! addressed by that relative path. [`reconcile`] removes blobs that the
//! caller's record store no longer references.

pub mod blob_id;
pub mod error;
pub mod local_store;
pub mod path_resolver;
pub mod reconcile;
pub mod store;

pub use blob_id::BlobId;
pub use error::{StorageError, StorageResult};
pub use local_store::LocalFileBlobStore;
pub use path_resolver::PathResolver;
pub use reconcile::{find_orphans, reconcile_orphans};
pub use store::BlobStore;
