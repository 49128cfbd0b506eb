// ABOUTME: Shared backing stores used by every session
// Credentials, per-user workspace trees and the append-only action log

pub mod action_log;
pub mod credentials;
pub mod workspace;

pub use action_log::ActionLog;
pub use credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use workspace::{WorkspaceStore, WriteMode};
