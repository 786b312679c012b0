use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{StorageError, StorageResult};

/// Maps relative blob identifiers onto absolute paths inside a fixed root.
///
/// The root is canonicalized once; every resolved path is checked for
/// containment component-wise after symlinks have been followed.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` must already exist.
    pub fn new(root: &Path) -> io::Result<Self> {
        Ok(Self { root: root.canonicalize()? })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, identifier: &str) -> StorageResult<PathBuf> {
        check_lexically(identifier)?;

        let mut candidate = self.root.clone();
        for segment in segments(identifier) {
            candidate.push(segment);
        }

        let normalized = canonicalize_existing_prefix(&candidate)
            .map_err(|_| StorageError::invalid_path(identifier))?;
        if !normalized.starts_with(&self.root) || normalized == self.root {
            tracing::error!("Path traversal attempt detected: {}", identifier);
            return Err(StorageError::invalid_path(identifier));
        }
        Ok(normalized)
    }
}

fn segments(identifier: &str) -> impl Iterator<Item = &str> {
    identifier.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".")
}

fn check_lexically(identifier: &str) -> StorageResult<()> {
    let rejected = identifier.trim().is_empty()
        || identifier.contains('\0')
        || identifier.starts_with(['/', '\\'])
        || segments(identifier).any(|s| s == "..")
        || Path::new(identifier)
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir | Component::ParentDir));
    if rejected {
        tracing::error!("Invalid path detected: {:?}", identifier);
        return Err(StorageError::invalid_path(identifier));
    }
    Ok(())
}

/// Canonicalizes the deepest ancestor that exists and re-attaches the rest,
/// so identifiers of blobs that are not on disk still resolve.
fn canonicalize_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.symlink_metadata() {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = existing
                    .file_name()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no existing ancestor"))?;
                missing.push(name.to_owned());
                existing = existing
                    .parent()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no existing ancestor"))?;
            }
            Err(e) => return Err(e),
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn resolver() -> (tempfile::TempDir, PathResolver) {
        let dir = tempdir().unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_resolves_inside_root() {
        let (_dir, resolver) = resolver();
        let path = resolver.resolve("2024/01/15/abc.mp3").unwrap();
        assert!(path.starts_with(resolver.root()));
        assert!(path.ends_with("2024/01/15/abc.mp3"));
    }

    #[test]
    fn test_rejects_parent_segments() {
        let (_dir, resolver) = resolver();
        for id in ["..", "../etc/passwd", "2024/01/15/../../etc/passwd", "2024/..", "a\\..\\..\\b"] {
            let result = resolver.resolve(id);
            assert!(matches!(result, Err(StorageError::InvalidPath(_))), "accepted {}", id);
        }
    }

    #[test]
    fn test_rejects_absolute_and_empty() {
        let (_dir, resolver) = resolver();
        for id in ["/etc/passwd", "\\windows\\system32", "", "   ", "a\0b"] {
            let result = resolver.resolve(id);
            assert!(matches!(result, Err(StorageError::InvalidPath(_))), "accepted {:?}", id);
        }
    }

    #[test]
    fn test_dot_segments_are_harmless() {
        let (_dir, resolver) = resolver();
        let path = resolver.resolve("./2024/./01/x.wav").unwrap();
        assert!(path.ends_with("2024/01/x.wav"));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let (dir, resolver) = resolver();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"nope").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("2024")).unwrap();

        let result = resolver.resolve("2024/secret.txt");
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }
}
