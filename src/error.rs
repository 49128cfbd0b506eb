// ABOUTME: Error taxonomy for the workspace server
// Reportable errors carry the exact text sent to the client; connection errors end the session

use thiserror::Error;

/// Failures during registration or login. Reported to the client, the
/// session stays in the unauthenticated menu.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Registration failed")]
    RegistrationFailed,

    #[error("Invalid username")]
    InvalidUsername,

    #[error("Credential store error: {0}")]
    Backend(String),
}

/// Workspace-level failures. Reported to the client, the session continues
/// at the same menu.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project directory already exists")]
    ProjectExists,

    #[error("Project does not exist")]
    ProjectNotFound,

    #[error("File already exists")]
    FileExists,

    #[error("File does not exist")]
    FileNotFound,

    #[error("Failed to delete project files")]
    DeleteFailed,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transfer-layer failures. None of these are recoverable mid-stream: once the
/// size/payload coupling is broken the byte stream cannot be resynchronized.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transfer aborted: expected {expected} bytes, received {received}")]
    TransferAborted { expected: u64, received: u64 },

    #[error("Unknown transfer tag: {0}")]
    UnknownTag(u8),

    #[error("Path exceeds {0} bytes")]
    PathTooLong(usize),

    #[error("File too large for transfer: {0} bytes")]
    FileTooLarge(u64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-level failures. Always fatal to the owning session and never
/// propagated past it.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Peer closed the connection")]
    Disconnected,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
