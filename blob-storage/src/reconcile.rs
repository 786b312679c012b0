//! Orphan cleanup: blobs on disk that the record store no longer references.
//!
//! Runs are not synchronized internally. Callers must make sure only one
//! reconciliation (or other bulk delete) touches a storage root at a time,
//! otherwise a blob saved after the listing snapshot could be pruned.

use std::collections::{BTreeSet, HashSet};

use crate::blob_id::BlobId;
use crate::error::StorageResult;
use crate::store::BlobStore;

/// Blobs present in `store` but absent from `references`.
pub fn find_orphans<S>(store: &S, references: &HashSet<BlobId>) -> StorageResult<BTreeSet<BlobId>>
where
    S: BlobStore + ?Sized,
{
    let stored = store.list_all()?;
    Ok(stored.into_iter().filter(|id| !references.contains(id)).collect())
}

/// Deletes every orphan and returns how many were removed.
///
/// A failure to list the store aborts the run. A failure to delete a single
/// blob is logged and the remaining orphans are still processed.
pub fn reconcile_orphans<S>(store: &S, references: &HashSet<BlobId>) -> StorageResult<usize>
where
    S: BlobStore + ?Sized,
{
    tracing::info!("Starting orphaned blob cleanup");
    let orphans = find_orphans(store, references)?;

    let mut deleted = 0;
    for id in &orphans {
        match store.delete(id) {
            Ok(true) => {
                deleted += 1;
                tracing::info!("Deleted orphaned blob: {}", id);
            }
            Ok(false) => tracing::debug!("Orphaned blob already gone: {}", id),
            Err(e) => tracing::warn!("Failed to delete orphaned blob {}: {}", id, e),
        }
    }

    tracing::info!("Cleanup complete. Deleted {} of {} orphaned blobs", deleted, orphans.len());
    Ok(deleted)
}
