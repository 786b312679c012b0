use std::io;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(unix)]
const DISK_FULL_CODES: &[i32] = &[28];
#[cfg(windows)]
const DISK_FULL_CODES: &[i32] = &[39, 112];
#[cfg(not(any(unix, windows)))]
const DISK_FULL_CODES: &[i32] = &[];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Permission denied while {action}")]
    PermissionDenied {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Disk full while {action}")]
    DiskFull {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Storage failure while {action}")]
    StorageFailure {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn invalid_path(identifier: impl Into<String>) -> Self {
        StorageError::InvalidPath(identifier.into())
    }

    /// Sorts an I/O error into permission, out-of-space, or generic failure.
    pub fn from_io(action: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            return StorageError::PermissionDenied { action, source };
        }
        match source.raw_os_error() {
            Some(code) if DISK_FULL_CODES.contains(&code) => StorageError::DiskFull { action, source },
            _ => StorageError::StorageFailure { action, source },
        }
    }
}
