use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::blob_id::BlobId;
use crate::error::{StorageError, StorageResult};
use crate::path_resolver::PathResolver;
use crate::store::BlobStore;

/// Extensions the upload path is expected to produce. Others are stored
/// anyway but logged.
pub const KNOWN_EXTENSIONS: [&str; 3] = [".wav", ".mp3", ".m4a"];

/// Blob store backed by a local directory, laid out as
/// `<root>/YYYY/MM/DD/<uuid>.<ext>`.
#[derive(Clone, Debug)]
pub struct LocalFileBlobStore {
    resolver: PathResolver,
}

impl LocalFileBlobStore {
    /// Creates `base_path` (and parents) if needed.
    pub fn new(base_path: impl AsRef<Path>) -> StorageResult<Self> {
        let base_path = base_path.as_ref();
        fs::create_dir_all(base_path).map_err(|e| StorageError::from_io("creating storage root", e))?;
        let resolver = PathResolver::new(base_path).map_err(|e| StorageError::from_io("opening storage root", e))?;
        tracing::info!("Blob store initialized with base path: {}", resolver.root().display());
        Ok(Self { resolver })
    }

    pub fn base_path(&self) -> &Path {
        self.resolver.root()
    }

    /// Walks upward from `start` removing empty directories. Stops at the
    /// first directory that cannot be removed and never touches the root.
    fn prune_empty_partitions(&self, start: &Path) {
        let root = self.base_path();
        let depth = match start.strip_prefix(root) {
            Ok(relative) => relative.components().count(),
            Err(_) => return,
        };

        let mut current = start;
        for _ in 0..depth {
            if current == root {
                break;
            }
            if let Err(e) = fs::remove_dir(current) {
                tracing::debug!("Stopped partition cleanup at {}: {}", current.display(), e);
                break;
            }
            tracing::debug!("Removed empty directory: {}", current.display());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }
}

/// Lowercases, trims and dot-prefixes an extension (`"MP3"` -> `".mp3"`).
pub fn normalize_extension(extension: &str) -> StorageResult<String> {
    let ext = extension.trim().to_lowercase();
    let ext = if ext.starts_with('.') { ext } else { format!(".{}", ext) };
    if ext == "." || ext.contains(['/', '\\', '\0']) || ext.contains("..") {
        return Err(StorageError::invalid_path(format!("extension {:?}", extension)));
    }
    Ok(ext)
}

pub fn partition_for(date: NaiveDate) -> String {
    format!("{:04}/{:02}/{:02}", date.year(), date.month(), date.day())
}

fn write_new_file(path: &Path, source: &mut dyn Read) -> StorageResult<u64> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| StorageError::from_io("creating blob file", e))?;

    let written = match io::copy(source, &mut file) {
        Ok(n) => file.flush().and_then(|_| file.sync_all()).map(|_| n),
        Err(e) => Err(e),
    };

    match written {
        Ok(n) => Ok(n),
        Err(e) => {
            drop(file);
            if let Err(cleanup) = fs::remove_file(path) {
                tracing::warn!("Could not remove partial blob {}: {}", path.display(), cleanup);
            }
            tracing::error!("Error writing blob {}: {}", path.display(), e);
            Err(StorageError::from_io("writing blob file", e))
        }
    }
}

/// `None` when a component is not valid UTF-8; such a file could never be
/// addressed again by its identifier.
fn to_identifier(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

impl BlobStore for LocalFileBlobStore {
    fn save(&self, source: &mut dyn Read, extension: &str, date: Option<NaiveDate>) -> StorageResult<BlobId> {
        let ext = normalize_extension(extension)?;
        if !KNOWN_EXTENSIONS.contains(&ext.as_str()) {
            tracing::warn!("Unusual file extension: {}", ext);
        }

        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let partition = partition_for(date);
        let relative = format!("{}/{}{}", partition, Uuid::new_v4(), ext);

        // Resolve before creating anything, so a symlinked partition cannot
        // make us create directories outside the root.
        let directory = self.resolver.resolve(&partition)?;
        fs::create_dir_all(&directory).map_err(|e| StorageError::from_io("creating partition directory", e))?;

        let full_path = self.resolver.resolve(&relative)?;
        let size = write_new_file(&full_path, source)?;

        tracing::info!("Audio blob saved: {} ({} bytes)", relative, size);
        Ok(BlobId::from(relative))
    }

    fn resolve(&self, id: &BlobId) -> StorageResult<PathBuf> {
        self.resolver.resolve(id.as_str())
    }

    fn delete(&self, id: &BlobId) -> StorageResult<bool> {
        let full_path = self.resolve(id)?;

        match fs::symlink_metadata(&full_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                tracing::warn!("Not a blob file, nothing deleted: {}", id);
                return Ok(false);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Blob not found for deletion: {}", id);
                return Ok(false);
            }
            Err(e) => return Err(StorageError::from_io("inspecting blob file", e)),
        }

        match fs::remove_file(&full_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                tracing::error!("Error deleting blob {}: {}", id, e);
                return Err(StorageError::from_io("deleting blob file", e));
            }
        }
        tracing::info!("Audio blob deleted: {}", id);

        if let Some(parent) = full_path.parent() {
            self.prune_empty_partitions(parent);
        }
        Ok(true)
    }

    fn list_all(&self) -> StorageResult<BTreeSet<BlobId>> {
        let root = self.base_path();
        let mut blobs = BTreeSet::new();
        if !root.exists() {
            return Ok(blobs);
        }

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(|e| StorageError::from_io("scanning storage", e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| StorageError::from_io("scanning storage", io::Error::new(io::ErrorKind::Other, e)))?;
            match to_identifier(relative) {
                Some(id) => {
                    blobs.insert(BlobId::from(id));
                }
                None => tracing::warn!("Skipping blob with non UTF-8 name: {}", entry.path().display()),
            }
        }

        tracing::debug!("Found {} blobs in storage", blobs.len());
        Ok(blobs)
    }
}
