// ABOUTME: File tree entry model shared by the workspace store and the transfer codec

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Regular,
    Directory,
}

/// One node of a walked tree, path relative to the walk root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub relative_path: PathBuf,
    pub kind: EntryKind,
}

impl FileEntry {
    pub fn regular(path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::Regular,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Directory listing row as returned by the workspace store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Accepts only non-empty paths made of plain name segments. Rejects `..`,
/// absolute roots, drive prefixes; `.` segments are dropped.
pub fn sanitize_relative(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Single-segment names for users, projects and files typed at the menu
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
