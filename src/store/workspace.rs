// ABOUTME: Filesystem-backed workspace store shared by all sessions
// Every path is relative to the store root, validated and refused if it passes through a symlink

use crate::error::StoreError;
use crate::models::{sanitize_relative, DirEntry, EntryKind};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// Per-user trees live directly under `root`: `<root>/<user>/<project>/...`.
/// Users' subtrees are disjoint, so the store needs no locking of its own;
/// single operations rely on the filesystem's atomicity.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store root if it does not exist yet
    pub async fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store-relative path to its on-disk location
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf, StoreError> {
        sanitize_relative(relative)
            .map(|clean| self.root.join(clean))
            .ok_or_else(|| StoreError::InvalidPath(relative.display().to_string()))
    }

    /// Like [`resolve`](Self::resolve), but refuses paths whose existing
    /// components below the root include a symlink. With `include_last`
    /// unset the final component may itself be a link (it is removed, not
    /// followed).
    async fn confine(&self, relative: &Path, include_last: bool) -> Result<PathBuf, StoreError> {
        let resolved = self.resolve(relative)?;
        let Ok(below_root) = resolved.strip_prefix(&self.root) else {
            return Err(StoreError::InvalidPath(relative.display().to_string()));
        };
        let components: Vec<_> = below_root.components().collect();
        let checked = if include_last {
            components.len()
        } else {
            components.len().saturating_sub(1)
        };

        let mut path = self.root.clone();
        for component in &components[..checked] {
            path.push(component);
            match fs::symlink_metadata(&path).await {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    warn!("Refusing symlinked path {}", path.display());
                    return Err(StoreError::InvalidPath(relative.display().to_string()));
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(resolved)
    }

    /// Create a directory and any missing parents; existing directories are fine
    pub async fn ensure_dir(&self, relative: &Path) -> Result<(), StoreError> {
        let path = self.confine(relative, true).await?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    /// Create a directory that must not exist yet
    pub async fn create_dir(&self, relative: &Path) -> Result<(), StoreError> {
        let path = self.confine(relative, true).await?;
        match fs::create_dir(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::ProjectExists),
            Err(e) => Err(e.into()),
        }
    }

    /// List directory entries sorted by name. Anything that is neither a
    /// regular file nor a directory is skipped, symlinks included.
    pub async fn list_entries(&self, relative: &Path) -> Result<Vec<DirEntry>, StoreError> {
        let path = self.confine(relative, true).await?;
        let mut reader = match fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::ProjectNotFound),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::Regular
            } else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn read_file(&self, relative: &Path) -> Result<Vec<u8>, StoreError> {
        let path = self.confine(relative, true).await?;
        if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(StoreError::FileNotFound);
        }
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::FileNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_file(
        &self,
        relative: &Path,
        bytes: &[u8],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let path = self.confine(relative, true).await?;
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        let mut file = options.open(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Create an empty file that must not exist yet
    pub async fn create_file(&self, relative: &Path) -> Result<(), StoreError> {
        let path = self.confine(relative, true).await?;
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::FileExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a fresh or truncated file for streaming writes, creating parents
    pub async fn open_writer(&self, relative: &Path) -> Result<File, StoreError> {
        let path = self.confine(relative, true).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(File::create(&path).await?)
    }

    /// Open a regular file for streaming reads, returning it with its length
    pub async fn open_reader(&self, relative: &Path) -> Result<(File, u64), StoreError> {
        let path = self.confine(relative, true).await?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(StoreError::FileNotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::FileNotFound),
            Err(e) => return Err(e.into()),
        };
        let file = File::open(&path).await?;
        Ok((file, metadata.len()))
    }

    /// Remove a regular file
    pub async fn remove_file(&self, relative: &Path) -> Result<(), StoreError> {
        let path = self.confine(relative, false).await?;
        match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(StoreError::FileNotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::FileNotFound),
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&path).await?;
        Ok(())
    }

    /// Remove a file, a symlink or an empty directory
    pub async fn remove_entry(&self, relative: &Path) -> Result<(), StoreError> {
        let path = self.confine(relative, false).await?;
        let metadata = fs::symlink_metadata(&path).await?;
        if metadata.is_dir() {
            fs::remove_dir(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    /// Store-relative paths under the directory `relative` in removal order:
    /// children before their parent, siblings by file name, the directory
    /// itself last. Symlinks are listed, never followed.
    pub async fn removal_order(&self, relative: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let path = self.confine(relative, true).await?;
        match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(StoreError::ProjectNotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::ProjectNotFound),
            Err(e) => return Err(e.into()),
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&path)
                .follow_links(false)
                .contents_first(true)
                .sort_by_file_name()
                .into_iter()
                .map(|entry| {
                    let entry = entry.map_err(|e| {
                        warn!("Failed to scan {} for deletion: {}", path.display(), e);
                        StoreError::DeleteFailed
                    })?;
                    entry
                        .path()
                        .strip_prefix(&root)
                        .map(Path::to_path_buf)
                        .map_err(|_| StoreError::DeleteFailed)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|_| StoreError::DeleteFailed)?
    }

    /// Remove `order` entry by entry. The first failing removal aborts with
    /// `DeleteFailed`; whatever was already removed stays removed.
    pub async fn remove_entries(&self, order: &[PathBuf]) -> Result<(), StoreError> {
        for relative in order {
            if let Err(e) = self.remove_entry(relative).await {
                warn!("Failed to delete {}: {}", relative.display(), e);
                return Err(StoreError::DeleteFailed);
            }
        }
        Ok(())
    }

    /// Remove every entry below `relative`, then the directory itself
    pub async fn remove_tree(&self, relative: &Path) -> Result<(), StoreError> {
        let order = self.removal_order(relative).await?;
        self.remove_entries(&order).await?;
        debug!("Deleted {} entries under {}", order.len(), relative.display());
        Ok(())
    }

    pub async fn exists(&self, relative: &Path) -> bool {
        match self.confine(relative, true).await {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn is_dir(&self, relative: &Path) -> bool {
        match self.confine(relative, true).await {
            Ok(path) => fs::symlink_metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}
