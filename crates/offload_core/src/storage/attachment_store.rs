//! File-backed attachment storage confined to one managed directory.
//!
//! # Responsibility
//! - Write attachment payloads atomically under the managed root.
//! - Refuse to read or delete anything that resolves outside that root.
//!
//! # Invariants
//! - Every path is normalized (`.`/`..` removed, then symlinks resolved
//!   through the longest existing ancestor) before the containment check,
//!   and the root is resolved the same way.
//! - The managed root itself is never a valid attachment path.
//! - A written file is either fully present or absent; partial writes are
//!   never observable under the final name.
//! - Single writer: concurrent writers are not coordinated.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const ATTACHMENT_EXTENSION: &str = "attachment";
const APP_DIR_NAME: &str = "Offload";
const ATTACHMENTS_DIR_NAME: &str = "Attachments";

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Attachment storage failures.
#[derive(Debug)]
pub enum AttachmentError {
    /// Path is relative, not UTF-8, or resolves outside the managed root.
    Validation(String),
    /// Filesystem operation failed.
    Io(io::Error),
}

impl Display for AttachmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid attachment path: {message}"),
            Self::Io(err) => write!(f, "attachment io failure: {err}"),
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(_) => None,
            Self::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for AttachmentError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Storage contract used by services; paths are opaque to callers.
pub trait AttachmentStorage {
    /// Persists bytes for an owner and returns the stored absolute path.
    fn store(&self, data: &[u8], owner_id: Uuid) -> AttachmentResult<String>;
    /// Reads bytes from a path previously returned by `store`.
    fn load(&self, path: &str) -> AttachmentResult<Vec<u8>>;
    /// Deletes a stored attachment; a missing file is not an error.
    fn remove(&self, path: &str) -> AttachmentResult<()>;
    /// Returns `true` only for a valid managed path that exists.
    fn exists(&self, path: &str) -> bool;
}

impl<S: AttachmentStorage + ?Sized> AttachmentStorage for &S {
    fn store(&self, data: &[u8], owner_id: Uuid) -> AttachmentResult<String> {
        (**self).store(data, owner_id)
    }

    fn load(&self, path: &str) -> AttachmentResult<Vec<u8>> {
        (**self).load(path)
    }

    fn remove(&self, path: &str) -> AttachmentResult<()> {
        (**self).remove(path)
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }
}

/// Attachment store rooted at one managed directory.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Creates a store for `root`. The directory is created lazily on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default managed directory below an app data directory.
    pub fn default_root(base_dir: &Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join(ATTACHMENTS_DIR_NAME)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` and checks that it lies strictly below the root.
    fn validated_path(&self, path: &str) -> AttachmentResult<PathBuf> {
        let candidate = Path::new(path);
        if path.trim().is_empty() || !candidate.is_absolute() {
            return Err(AttachmentError::Validation(
                "attachment path must be absolute".to_string(),
            ));
        }

        let root = resolve_path(&std::path::absolute(&self.root)?)?;
        let resolved = resolve_path(candidate)?;
        if resolved == root || !resolved.starts_with(&root) {
            return Err(AttachmentError::Validation(
                "attachment path is outside app-managed storage".to_string(),
            ));
        }

        Ok(resolved)
    }
}

impl AttachmentStorage for AttachmentStore {
    fn store(&self, data: &[u8], owner_id: Uuid) -> AttachmentResult<String> {
        fs::create_dir_all(&self.root)?;

        let file_name = format!("{owner_id}-{}.{ATTACHMENT_EXTENSION}", Uuid::new_v4());
        let target = self.root.join(file_name);

        // Temp file must share the target directory for an atomic rename.
        let mut temp = tempfile::Builder::new()
            .prefix(".pending-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|err| AttachmentError::Io(err.error))?;

        let canonical = fs::canonicalize(&target)?;
        let stored = canonical.to_str().map(str::to_string).ok_or_else(|| {
            AttachmentError::Validation("attachment path is not valid UTF-8".to_string())
        })?;

        info!(
            "event=attachment_store module=storage status=ok bytes={}",
            data.len()
        );
        Ok(stored)
    }

    fn load(&self, path: &str) -> AttachmentResult<Vec<u8>> {
        let validated = self.validated_path(path)?;
        Ok(fs::read(validated)?)
    }

    fn remove(&self, path: &str) -> AttachmentResult<()> {
        let validated = self.validated_path(path)?;
        match fs::remove_file(&validated) {
            Ok(()) => {
                info!("event=attachment_remove module=storage status=ok");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!("event=attachment_remove module=storage status=error error={err}");
                Err(err.into())
            }
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.validated_path(path)
            .map(|validated| validated.is_file())
            .unwrap_or(false)
    }
}

/// Removes `.` and `..` without touching the filesystem.
///
/// `..` at the root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Normalizes lexically, then resolves symlinks through the longest
/// existing ancestor and re-appends the missing tail.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut missing_tail = Vec::new();

    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for part in missing_tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(err) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing_tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_lexically, resolve_path};
    use std::path::{Path, PathBuf};

    #[test]
    fn normalize_lexically_drops_dot_segments() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(
            normalize_lexically(Path::new("/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
    }

    #[test]
    fn resolve_path_keeps_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        let resolved = resolve_path(&dir.path().join("missing/child.bin")).unwrap();
        assert_eq!(resolved, base.join("missing").join("child.bin"));
    }
}
