use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::blob_id::BlobId;
use crate::error::StorageResult;

/// Durable storage for opaque audio blobs addressed by [`BlobId`].
pub trait BlobStore {
    /// Streams `source` into a new blob and returns its relative identifier.
    /// The partition is taken from `date`, or today when `None`.
    fn save(&self, source: &mut dyn Read, extension: &str, date: Option<NaiveDate>) -> StorageResult<BlobId>;

    /// Absolute location of a blob; fails with `InvalidPath` for identifiers
    /// that would escape the storage root.
    fn resolve(&self, id: &BlobId) -> StorageResult<PathBuf>;

    /// Removes a blob. Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &BlobId) -> StorageResult<bool>;

    /// Every blob currently on disk.
    fn list_all(&self) -> StorageResult<BTreeSet<BlobId>>;
}
