// ABOUTME: Pure pre-order traversal of a local directory tree
// Produces relative FileEntry values lazily; no network I/O happens here

use crate::models::FileEntry;
use std::io;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Lazy pre-order walk below `root`. Every directory is yielded before its
/// descendants; siblings come in file-name order so transfers are
/// reproducible. The root itself, symlinks and special files are skipped.
pub struct TreeWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl TreeWalk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let inner = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self { root, inner }
    }
}

impl Iterator for TreeWalk {
    type Item = io::Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                return Some(Ok(FileEntry::directory(relative)));
            }
            if file_type.is_file() {
                return Some(Ok(FileEntry::regular(relative)));
            }
        }
    }
}

/// Convenience wrapper over [`TreeWalk::new`]
pub fn walk(root: impl Into<PathBuf>) -> TreeWalk {
    TreeWalk::new(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_walk_is_preorder_and_sorted() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/inner")).unwrap();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("z.txt"), "z").unwrap();
        std::fs::write(root.join("b/inner/deep.txt"), "d").unwrap();
        std::fs::write(root.join("b/file.txt"), "f").unwrap();

        let entries: Vec<FileEntry> = walk(root).collect::<io::Result<_>>().unwrap();

        assert_eq!(
            entries,
            vec![
                FileEntry::directory("a"),
                FileEntry::directory("b"),
                FileEntry::regular("b/file.txt"),
                FileEntry::directory("b/inner"),
                FileEntry::regular("b/inner/deep.txt"),
                FileEntry::regular("z.txt"),
            ]
        );
    }

    #[test]
    fn test_walk_empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(walk(dir.path()).count(), 0);
    }

    #[test]
    fn test_walk_missing_root_yields_error() {
        let dir = TempDir::new().unwrap();
        let mut walker = walk(dir.path().join("missing"));
        assert!(matches!(walker.next(), Some(Err(_))));
    }
}
