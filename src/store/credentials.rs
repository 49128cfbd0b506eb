// ABOUTME: Credential store keyed by username with SQLite and in-memory backends
// Uniqueness of usernames is enforced by the backend itself, so concurrent registrations race safely

use crate::error::AuthError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    status INTEGER DEFAULT 1
);";

/// Lookup/insert service for user accounts. Passwords are opaque strings.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    fn exists(&self, username: &str) -> Result<bool, AuthError>;

    fn check(&self, username: &str, password: &str) -> Result<bool, AuthError>;

    /// Fails with `RegistrationFailed` when the write is rejected, including
    /// when another registration for the same name won the race.
    fn add(&self, username: &str, password: &str) -> Result<(), AuthError>;
}

pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::Backend(format!("failed to create db dir: {e}")))?;
        }
        let conn = Connection::open(path).map_err(map_sql_err)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory().map_err(map_sql_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuthError> {
        conn.execute_batch(SCHEMA).map_err(map_sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn user_count(&self) -> Result<i64, AuthError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(map_sql_err)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AuthError> {
        self.conn
            .lock()
            .map_err(|_| AuthError::Backend("credential store lock poisoned".to_string()))
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn exists(&self, username: &str) -> Result<bool, AuthError> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_err)?;
        Ok(id.is_some())
    }

    fn check(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1 AND password = ?2",
                params![username, password],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_err)?;
        Ok(id.is_some())
    }

    fn add(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![username, password],
        ) {
            Ok(_) => {
                debug!("Registered user {}", username);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to insert user {}: {}", username, e);
                Err(AuthError::RegistrationFailed)
            }
        }
    }
}

fn map_sql_err(err: rusqlite::Error) -> AuthError {
    AuthError::Backend(err.to_string())
}

/// Process-local store for tests and throwaway servers
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AuthError> {
        self.users
            .lock()
            .map_err(|_| AuthError::Backend("credential store lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn exists(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.lock()?.contains_key(username))
    }

    fn check(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        Ok(self
            .lock()?
            .get(username)
            .is_some_and(|stored| stored == password))
    }

    fn add(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut users = self.lock()?;
        if users.contains_key(username) {
            return Err(AuthError::RegistrationFailed);
        }
        users.insert(username.to_string(), password.to_string());
        Ok(())
    }
}
