// ABOUTME: Core data models for client sessions and transferred file trees

pub mod entry;
pub mod session;

pub use entry::{is_plain_name, sanitize_relative, DirEntry, EntryKind, FileEntry};
pub use session::{Session, SessionState};
