// ABOUTME: Session data model for one connected client and its position in the menu state machine

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Registering,
    LoggingIn,
    MainMenu,
    ProjectMenu,
    RemoteShell,
    Terminated,
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

/// Per-connection state. Owned by exactly one session task, never shared.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub peer: Option<SocketAddr>,
    pub username: String,
    pub current_project: String,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(peer: Option<SocketAddr>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            peer,
            username: String::new(),
            current_project: String::new(),
            state: SessionState::Unauthenticated,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Store-relative workspace root of the authenticated user
    pub fn workspace_root(&self) -> PathBuf {
        PathBuf::from(&self.username)
    }

    /// Store-relative root of the open project
    pub fn project_root(&self) -> PathBuf {
        self.workspace_root().join(&self.current_project)
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.last_activity = Utc::now();
    }

    pub fn authenticate(&mut self, username: &str) {
        self.username = username.to_string();
        self.set_state(SessionState::MainMenu);
    }

    pub fn enter_project(&mut self, project: &str) {
        self.current_project = project.to_string();
        self.set_state(SessionState::ProjectMenu);
    }

    pub fn leave_project(&mut self) {
        self.current_project.clear();
        self.set_state(SessionState::MainMenu);
    }

    pub fn terminate(&mut self) {
        self.set_state(SessionState::Terminated);
    }
}
