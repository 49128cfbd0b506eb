// ABOUTME: Per-connection session state machine driving menus, transfers and the command tunnel
// One engine owns one connection and one Session; shared stores are reached through SessionContext

use crate::error::{AuthError, ProtocolError, SessionError, StoreError};
use crate::models::{is_plain_name, EntryKind, Session, SessionState};
use crate::session::connection::Connection;
use crate::session::menu::{
    Confirmation, MainCommand, MenuCommand, ProjectCommand, WelcomeCommand, CHOICE_PROMPT,
    DOWNLOAD_FILE_PROMPT, DOWNLOAD_PROJECT_PROMPT, EDIT_END_MARKER, INTRODUCTION, RECEIVING_FILE,
    RECEIVING_PROJECT, SENDING_FILE, SENDING_PROJECT, SHELL_PROMPT, UPLOAD_FILE_PROMPT,
    UPLOAD_PROJECT_PROMPT,
};
use crate::store::{ActionLog, CredentialStore, WorkspaceStore, WriteMode};
use crate::transfer::{receive_file, receive_tree, send_store_file, send_tree, walk};
use crate::tunnel::{CommandTunnel, TunnelInput};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SHUTDOWN_NOTICE: &str = "Server is shutting down. Goodbye!\n";
const DELETE_CONFIRM_PROMPT: &str = "Are you sure to delete this project? (yes/no): ";

/// Shared collaborators handed to every session
#[derive(Clone)]
pub struct SessionContext {
    pub credentials: Arc<dyn CredentialStore>,
    pub workspace: WorkspaceStore,
    pub action_log: ActionLog,
    pub chunk_size: usize,
}

impl SessionContext {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        workspace: WorkspaceStore,
        action_log: ActionLog,
        chunk_size: usize,
    ) -> Self {
        Self {
            credentials,
            workspace,
            action_log,
            chunk_size,
        }
    }
}

pub struct SessionEngine<S> {
    conn: Connection<S>,
    session: Session,
    ctx: SessionContext,
    shutdown: CancellationToken,
}

impl<S> SessionEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: Option<SocketAddr>,
        ctx: SessionContext,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conn: Connection::new(stream),
            session: Session::new(peer),
            ctx,
            shutdown,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session until logout, exit, shutdown or a connection
    /// failure. The connection is shut down on every exit path.
    pub async fn run(mut self) -> Result<Session, SessionError> {
        info!("Session {} started", self.session.id);
        let result = self.drive().await;
        if let Err(e) = self.conn.shutdown().await {
            debug!("Connection shutdown failed: {}", e);
        }
        self.session.terminate();
        match result {
            Ok(()) => {
                info!("Session {} ended", self.session.id);
                Ok(self.session)
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        loop {
            if self.session.state.is_terminated() {
                return Ok(());
            }
            // Every menu redisplay is a shutdown checkpoint
            if self.shutdown.is_cancelled() {
                info!("Shutdown observed, closing session {}", self.session.id);
                self.conn.send(SHUTDOWN_NOTICE).await?;
                self.session.terminate();
                return Ok(());
            }

            match self.session.state {
                SessionState::Unauthenticated => self.welcome().await?,
                SessionState::Registering => self.register().await?,
                SessionState::LoggingIn => self.login().await?,
                SessionState::MainMenu => self.main_menu().await?,
                SessionState::ProjectMenu => self.project_menu().await?,
                SessionState::RemoteShell => self.remote_shell().await?,
                SessionState::Terminated => return Ok(()),
            }
        }
    }

    async fn choose<C: MenuCommand>(&mut self) -> Result<Option<C>, SessionError> {
        self.conn.send(C::MENU).await?;
        let line = self.conn.prompt(CHOICE_PROMPT).await?;
        Ok(C::parse(&line))
    }

    async fn report(&mut self, message: impl Display) -> Result<(), SessionError> {
        self.conn.send(&format!("{message}\n")).await
    }

    async fn with_credentials<T, F>(&self, op: F) -> Result<T, AuthError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CredentialStore) -> Result<T, AuthError> + Send + 'static,
    {
        let store = Arc::clone(&self.ctx.credentials);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?
    }

    async fn record(&self, file_name: &str, action: &str) {
        self.ctx
            .action_log
            .record(&self.session.username, file_name, action)
            .await;
    }

    /// Ask for a name that is used as a single path component
    async fn prompt_name(&mut self, prompt: &str) -> Result<Option<String>, SessionError> {
        let name = self.conn.prompt(prompt).await?;
        if is_plain_name(&name) {
            Ok(Some(name))
        } else {
            self.report("Invalid name").await?;
            Ok(None)
        }
    }

    // Unauthenticated states

    async fn welcome(&mut self) -> Result<(), SessionError> {
        match self.choose::<WelcomeCommand>().await? {
            Some(WelcomeCommand::Introduction) => self.conn.send(INTRODUCTION).await?,
            Some(WelcomeCommand::Register) => self.session.set_state(SessionState::Registering),
            Some(WelcomeCommand::Login) => self.session.set_state(SessionState::LoggingIn),
            Some(WelcomeCommand::Exit) => {
                self.conn.send("Goodbye!\n").await?;
                self.session.terminate();
            }
            None => self.report("Invalid choice").await?,
        }
        Ok(())
    }

    async fn register(&mut self) -> Result<(), SessionError> {
        let username = self.conn.prompt("Enter username: ").await?;
        let password = self.conn.prompt("Enter password: ").await?;

        let outcome = if is_plain_name(&username) {
            let name = username.clone();
            self.with_credentials(move |store| {
                if store.exists(&name)? {
                    return Err(AuthError::UsernameTaken);
                }
                store.add(&name, &password)
            })
            .await
        } else {
            Err(AuthError::InvalidUsername)
        };

        match outcome {
            Ok(()) => {
                info!("Registered user {}", username);
                self.conn.send("Registration successful!\n").await?;
            }
            Err(e) => {
                debug!("Registration of {} failed: {}", username, e);
                self.report(e).await?;
            }
        }
        self.session.set_state(SessionState::Unauthenticated);
        Ok(())
    }

    async fn login(&mut self) -> Result<(), SessionError> {
        let username = self.conn.prompt("Enter username: ").await?;
        let password = self.conn.prompt("Enter password: ").await?;

        let outcome = if is_plain_name(&username) {
            let name = username.clone();
            self.with_credentials(move |store| store.check(&name, &password))
                .await
        } else {
            Ok(false)
        };

        match outcome {
            Ok(true) => {
                let root = PathBuf::from(&username);
                if let Err(e) = self.ctx.workspace.ensure_dir(&root).await {
                    warn!("Failed to prepare workspace for {}: {}", username, e);
                    self.report(e).await?;
                    self.session.set_state(SessionState::Unauthenticated);
                    return Ok(());
                }
                info!("User {} logged in", username);
                self.session.authenticate(&username);
                self.conn.send("Login successful!\n").await?;
            }
            Ok(false) => {
                self.report(AuthError::InvalidCredentials).await?;
                self.session.set_state(SessionState::Unauthenticated);
            }
            Err(e) => {
                warn!("Login lookup failed: {}", e);
                self.report(e).await?;
                self.session.set_state(SessionState::Unauthenticated);
            }
        }
        Ok(())
    }

    // Main menu

    async fn main_menu(&mut self) -> Result<(), SessionError> {
        let Some(command) = self.choose::<MainCommand>().await? else {
            return self.report("Invalid choice").await;
        };

        match command {
            MainCommand::ListProjects => self.list_projects().await,
            MainCommand::CreateProject => self.create_project().await,
            MainCommand::OpenProject => self.open_project().await,
            MainCommand::DeleteProject => self.delete_project().await,
            MainCommand::UploadProject => self.upload_project().await,
            MainCommand::DownloadProject => self.download_project().await,
            MainCommand::RemoteCommand => {
                self.session.set_state(SessionState::RemoteShell);
                Ok(())
            }
            MainCommand::Logout => {
                info!("User {} logged out", self.session.username);
                self.conn.send("Logging out...\n").await?;
                self.session.terminate();
                Ok(())
            }
        }
    }

    async fn list_projects(&mut self) -> Result<(), SessionError> {
        let root = self.session.workspace_root();
        match self.ctx.workspace.list_entries(&root).await {
            Ok(entries) => {
                let names: Vec<String> = entries
                    .into_iter()
                    .filter(|e| e.kind == EntryKind::Directory)
                    .map(|e| e.name)
                    .collect();
                self.send_listing("Projects:", "No projects found.", &names).await
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn send_listing(
        &mut self,
        title: &str,
        empty: &str,
        names: &[String],
    ) -> Result<(), SessionError> {
        if names.is_empty() {
            return self.report(empty).await;
        }
        let mut text = format!("{title}\n");
        for name in names {
            text.push_str("- ");
            text.push_str(name);
            text.push('\n');
        }
        self.conn.send(&text).await
    }

    async fn create_project(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter project name: ").await? else {
            return Ok(());
        };
        let path = self.session.workspace_root().join(&name);
        match self.ctx.workspace.create_dir(&path).await {
            Ok(()) => {
                self.record(&name, "Created project").await;
                self.report("Project created successfully.").await
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn open_project(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter project name to open: ").await? else {
            return Ok(());
        };
        let path = self.session.workspace_root().join(&name);
        if !self.ctx.workspace.is_dir(&path).await {
            return self.report(StoreError::ProjectNotFound).await;
        }
        self.session.enter_project(&name);
        self.report(format!("Opened project {name}")).await
    }

    async fn delete_project(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter project name to delete: ").await? else {
            return Ok(());
        };
        let path = self.session.workspace_root().join(&name);
        if !self.ctx.workspace.is_dir(&path).await {
            return self.report(StoreError::ProjectNotFound).await;
        }

        let answer = self.conn.prompt(DELETE_CONFIRM_PROMPT).await?;
        if Confirmation::parse(&answer) == Confirmation::No {
            return self.report("Deletion cancelled.").await;
        }

        match self.ctx.workspace.remove_tree(&path).await {
            Ok(()) => {
                self.record(&name, "Deleted project").await;
                self.report("Project deleted successfully.").await
            }
            Err(e) => {
                warn!("Deleting project {} failed: {}", name, e);
                self.report(e).await
            }
        }
    }

    /// Report a failed transfer and hand back the fatal error. The stream
    /// position is unknown after this, so the session cannot continue.
    async fn abort_transfer(&mut self, err: ProtocolError) -> SessionError {
        warn!("Transfer failed: {}", err);
        if let Err(e) = self.report(format!("Transfer failed: {err}")).await {
            debug!("Could not report transfer failure: {}", e);
        }
        SessionError::Protocol(err)
    }

    async fn upload_project(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name(UPLOAD_PROJECT_PROMPT).await? else {
            return Ok(());
        };
        let target = self.session.workspace_root().join(&name);
        self.report(format!("{RECEIVING_PROJECT}{name}")).await?;

        let received = receive_tree(
            self.conn.stream_mut(),
            &self.ctx.workspace,
            &target,
            self.ctx.chunk_size,
        )
        .await;
        match received {
            Ok(summary) => {
                self.record(&name, "Uploaded project").await;
                self.report(format!(
                    "Project uploaded successfully. ({} files, {} directories)",
                    summary.files, summary.directories
                ))
                .await
            }
            Err(e) => Err(self.abort_transfer(e).await),
        }
    }

    async fn download_project(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name(DOWNLOAD_PROJECT_PROMPT).await? else {
            return Ok(());
        };
        let relative = self.session.workspace_root().join(&name);
        if !self.ctx.workspace.is_dir(&relative).await {
            return self.report(StoreError::ProjectNotFound).await;
        }
        let root = match self.ctx.workspace.resolve(&relative) {
            Ok(root) => root,
            Err(e) => return self.report(e).await,
        };

        // walkdir is blocking, so the listing is taken off the reactor first
        let walk_root = root.clone();
        let entries = tokio::task::spawn_blocking(move || walk(walk_root).collect::<Vec<_>>())
            .await
            .map_err(|e| SessionError::Io(std::io::Error::other(e)))?;

        self.report(format!("{SENDING_PROJECT}{name}")).await?;
        match send_tree(self.conn.stream_mut(), &root, entries, self.ctx.chunk_size).await {
            Ok(summary) => {
                debug!("Project {} sent: {:?}", name, summary);
                self.report("Project downloaded successfully.").await
            }
            Err(e) => Err(self.abort_transfer(e).await),
        }
    }

    // Project menu

    async fn project_menu(&mut self) -> Result<(), SessionError> {
        let project = self.session.project_root();
        if !self.ctx.workspace.is_dir(&project).await {
            self.report(StoreError::ProjectNotFound).await?;
            self.session.leave_project();
            return Ok(());
        }

        let Some(command) = self.choose::<ProjectCommand>().await? else {
            return self.report("Invalid choice").await;
        };

        match command {
            ProjectCommand::ListFiles => self.list_files(&project).await,
            ProjectCommand::CreateFile => self.create_file(&project).await,
            ProjectCommand::EditFile => self.edit_file(&project).await,
            ProjectCommand::UploadFile => self.upload_file(&project).await,
            ProjectCommand::DownloadFile => self.download_file(&project).await,
            ProjectCommand::DeleteFile => self.delete_file(&project).await,
            ProjectCommand::Return => {
                self.session.leave_project();
                Ok(())
            }
        }
    }

    fn log_name(&self, file: &str) -> String {
        format!("{}/{}", self.session.current_project, file)
    }

    async fn list_files(&mut self, project: &Path) -> Result<(), SessionError> {
        match self.ctx.workspace.list_entries(project).await {
            Ok(entries) => {
                let names: Vec<String> = entries
                    .into_iter()
                    .filter(|e| e.kind == EntryKind::Regular)
                    .map(|e| e.name)
                    .collect();
                self.send_listing("Files:", "No files found.", &names).await
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn create_file(&mut self, project: &Path) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter file name: ").await? else {
            return Ok(());
        };
        match self.ctx.workspace.create_file(&project.join(&name)).await {
            Ok(()) => {
                self.record(&self.log_name(&name), "Created file").await;
                self.report("File created successfully.").await
            }
            Err(e) => self.report(e).await,
        }
    }

    /// Show a file, then append client lines until one carrying the end marker
    async fn edit_file(&mut self, project: &Path) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter file name to open: ").await? else {
            return Ok(());
        };
        let path = project.join(&name);
        let content = match self.ctx.workspace.read_file(&path).await {
            Ok(content) => content,
            Err(e) => return self.report(e).await,
        };

        let mut text = format!("Content of {name}:\n");
        text.push_str(&String::from_utf8_lossy(&content));
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!(
            "Enter text to append, finish with a line containing {EDIT_END_MARKER}:\n"
        ));
        self.conn.send(&text).await?;

        let mut appended = String::new();
        loop {
            let line = self.conn.read_line().await?;
            if let Some(end) = line.find(EDIT_END_MARKER) {
                let before = &line[..end];
                if !before.is_empty() {
                    appended.push_str(before);
                    appended.push('\n');
                }
                break;
            }
            appended.push_str(&line);
            appended.push('\n');
        }

        if appended.is_empty() {
            return self.report("No changes made.").await;
        }
        match self
            .ctx
            .workspace
            .write_file(&path, appended.as_bytes(), WriteMode::Append)
            .await
        {
            Ok(()) => {
                self.record(&self.log_name(&name), "Edited file").await;
                self.report("File updated successfully.").await
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn upload_file(&mut self, project: &Path) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name(UPLOAD_FILE_PROMPT).await? else {
            return Ok(());
        };
        let target = project.join(&name);
        if self.ctx.workspace.is_dir(&target).await {
            return self.report(StoreError::FileExists).await;
        }
        self.report(format!("{RECEIVING_FILE}{name}")).await?;

        let received = receive_file(
            self.conn.stream_mut(),
            &self.ctx.workspace,
            &target,
            self.ctx.chunk_size,
        )
        .await;
        match received {
            Ok(bytes) => {
                debug!("Received {} bytes into {}", bytes, target.display());
                self.record(&self.log_name(&name), "Uploaded file").await;
                self.report("File uploaded successfully.").await
            }
            Err(e) => Err(self.abort_transfer(e).await),
        }
    }

    async fn download_file(&mut self, project: &Path) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name(DOWNLOAD_FILE_PROMPT).await? else {
            return Ok(());
        };
        let path = project.join(&name);
        if !self.ctx.workspace.exists(&path).await || self.ctx.workspace.is_dir(&path).await {
            return self.report(StoreError::FileNotFound).await;
        }

        self.report(format!("{SENDING_FILE}{name}")).await?;
        match send_store_file(
            self.conn.stream_mut(),
            &self.ctx.workspace,
            &path,
            self.ctx.chunk_size,
        )
        .await
        {
            Ok(bytes) => {
                debug!("Sent {} bytes from {}", bytes, path.display());
                Ok(())
            }
            Err(e) => Err(self.abort_transfer(e).await),
        }
    }

    async fn delete_file(&mut self, project: &Path) -> Result<(), SessionError> {
        let Some(name) = self.prompt_name("Enter file name to delete: ").await? else {
            return Ok(());
        };
        match self.ctx.workspace.remove_file(&project.join(&name)).await {
            Ok(()) => {
                self.record(&self.log_name(&name), "Deleted file").await;
                self.report("File deleted successfully.").await
            }
            Err(e) => self.report(e).await,
        }
    }

    // Remote shell

    async fn remote_shell(&mut self) -> Result<(), SessionError> {
        let opened = match self.ctx.workspace.resolve(&self.session.workspace_root()) {
            Ok(root) => CommandTunnel::open(&root).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let mut tunnel = match opened {
            Ok(tunnel) => tunnel,
            Err(message) => {
                warn!("Failed to open command tunnel: {}", message);
                self.report(message).await?;
                self.session.set_state(SessionState::MainMenu);
                return Ok(());
            }
        };

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let line = self.conn.prompt(SHELL_PROMPT).await?;
            match TunnelInput::parse(&line) {
                TunnelInput::Exit => break,
                TunnelInput::Empty => {}
                TunnelInput::ChangeDir(target) => match tunnel.change_dir(&target).await {
                    Ok(()) => {
                        let shown = tunnel
                            .cwd()
                            .strip_prefix(tunnel.root())
                            .map(|p| format!("~/{}", p.display()))
                            .unwrap_or_else(|_| "~".to_string());
                        self.report(format!("Current directory: {shown}")).await?;
                    }
                    Err(e) => self.report(e).await?,
                },
                TunnelInput::Run(command) => self.run_command(&tunnel, &command).await?,
            }
        }

        self.session.set_state(SessionState::MainMenu);
        Ok(())
    }

    /// Stream a command's output back line by line as it is produced
    async fn run_command(&mut self, tunnel: &CommandTunnel, command: &str) -> Result<(), SessionError> {
        debug!("Running '{}' in {}", command, tunnel.cwd().display());
        let mut output = match tunnel.spawn(command) {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to spawn '{}': {}", command, e);
                return self.report(e).await;
            }
        };

        while let Some(line) = output.next_line().await {
            match line {
                Ok(line) => self.report(line).await?,
                Err(e) => {
                    warn!("Reading command output failed: {}", e);
                    break;
                }
            }
        }

        match output.wait().await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => match status.code() {
                Some(code) => self.report(format!("Command exited with status {code}")).await,
                None => self.report("Command terminated by signal").await,
            },
            Err(e) => {
                warn!("Waiting for '{}' failed: {}", command, e);
                self.report("Failed to execute command").await
            }
        }
    }
}
