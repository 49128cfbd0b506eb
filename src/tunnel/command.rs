// ABOUTME: Command tunnel that runs shell input inside a user's workspace
// The working directory is tunnel-local and passed to each spawned process, never process-wide

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to change directory")]
    DirectoryNotFound(String),

    #[error("Failed to change directory")]
    OutsideWorkspace(String),

    #[error("Failed to execute command")]
    Spawn(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One line of shell input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelInput {
    Exit,
    ChangeDir(String),
    Run(String),
    Empty,
}

impl TunnelInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line == "exit" {
            return Self::Exit;
        }
        if line == "cd" {
            return Self::ChangeDir(String::new());
        }
        if let Some(target) = line.strip_prefix("cd ") {
            return Self::ChangeDir(target.trim().to_string());
        }
        Self::Run(line.to_string())
    }
}

type LineStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// A running command. Stdout and stderr are merged and yielded line by line
/// as the process produces them.
pub struct CommandOutput {
    child: Child,
    lines: LineStream,
}

impl CommandOutput {
    /// Next output line without its trailing newline, or `None` once both
    /// pipes are closed
    pub async fn next_line(&mut self) -> Option<io::Result<String>> {
        let raw = self.lines.next().await?;
        Some(raw.map(|mut bytes| {
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }))
    }

    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Shell tunnel pinned to one workspace root. `cd` only moves this tunnel's
/// notion of the current directory and can never leave the root.
#[derive(Debug, Clone)]
pub struct CommandTunnel {
    root: PathBuf,
    cwd: PathBuf,
}

impl CommandTunnel {
    /// `root` must exist; it is canonicalized so later containment checks
    /// compare like with like
    pub async fn open(root: &Path) -> Result<Self, TunnelError> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|_| TunnelError::DirectoryNotFound(root.display().to_string()))?;
        Ok(Self {
            cwd: root.clone(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Change the tunnel directory. An empty target returns to the root.
    pub async fn change_dir(&mut self, target: &str) -> Result<(), TunnelError> {
        if target.is_empty() {
            self.cwd = self.root.clone();
            return Ok(());
        }

        let candidate = self.cwd.join(target);
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| TunnelError::DirectoryNotFound(target.to_string()))?;
        if !resolved.starts_with(&self.root) {
            return Err(TunnelError::OutsideWorkspace(target.to_string()));
        }
        if !tokio::fs::metadata(&resolved).await?.is_dir() {
            return Err(TunnelError::DirectoryNotFound(target.to_string()));
        }

        debug!("Tunnel directory now {}", resolved.display());
        self.cwd = resolved;
        Ok(())
    }

    /// Spawn `sh -c <line>` in the tunnel directory
    pub fn spawn(&self, line: &str) -> Result<CommandOutput, TunnelError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(line)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TunnelError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TunnelError::Spawn(io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TunnelError::Spawn(io::Error::other("stderr not captured")))?;

        let out_lines = SplitStream::new(BufReader::new(stdout).split(b'\n'));
        let err_lines = SplitStream::new(BufReader::new(stderr).split(b'\n'));

        Ok(CommandOutput {
            child,
            lines: Box::pin(out_lines.merge(err_lines)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_inputs() {
        assert_eq!(TunnelInput::parse("exit"), TunnelInput::Exit);
        assert_eq!(TunnelInput::parse("  exit \r"), TunnelInput::Exit);
        assert_eq!(TunnelInput::parse(""), TunnelInput::Empty);
        assert_eq!(TunnelInput::parse("cd sub"), TunnelInput::ChangeDir("sub".into()));
        assert_eq!(TunnelInput::parse("cd"), TunnelInput::ChangeDir(String::new()));
        assert_eq!(TunnelInput::parse("ls -la"), TunnelInput::Run("ls -la".into()));
        assert_eq!(TunnelInput::parse("cdrom"), TunnelInput::Run("cdrom".into()));
    }

    #[tokio::test]
    async fn test_change_dir_stays_inside_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut tunnel = CommandTunnel::open(dir.path()).await.unwrap();

        tunnel.change_dir("sub").await.unwrap();
        assert!(tunnel.cwd().ends_with("sub"));

        assert!(matches!(
            tunnel.change_dir("../..").await,
            Err(TunnelError::OutsideWorkspace(_))
        ));
        assert!(tunnel.cwd().ends_with("sub"));

        assert!(matches!(
            tunnel.change_dir("missing").await,
            Err(TunnelError::DirectoryNotFound(_))
        ));

        tunnel.change_dir("").await.unwrap();
        assert_eq!(tunnel.cwd(), tunnel.root());
    }

    #[tokio::test]
    async fn test_spawn_runs_in_tunnel_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/marker.txt"), "x").unwrap();
        let mut tunnel = CommandTunnel::open(dir.path()).await.unwrap();
        tunnel.change_dir("sub").await.unwrap();

        let mut output = tunnel.spawn("ls").unwrap();
        let mut lines = Vec::new();
        while let Some(line) = output.next_line().await {
            lines.push(line.unwrap());
        }
        assert!(output.wait().await.unwrap().success());
        assert_eq!(lines, vec!["marker.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_stderr_is_merged_and_status_reported() {
        let dir = TempDir::new().unwrap();
        let tunnel = CommandTunnel::open(dir.path()).await.unwrap();

        let mut output = tunnel.spawn("echo out; echo err 1>&2; exit 3").unwrap();
        let mut lines = Vec::new();
        while let Some(line) = output.next_line().await {
            lines.push(line.unwrap());
        }
        lines.sort();
        assert_eq!(lines, vec!["err".to_string(), "out".to_string()]);
        assert_eq!(output.wait().await.unwrap().code(), Some(3));
    }
}
