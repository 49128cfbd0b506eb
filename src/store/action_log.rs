// ABOUTME: Append-only text log of user actions on files and projects
// Write-only: nothing in the server reads it back

use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Failures are logged and otherwise ignored.
    pub async fn record(&self, username: &str, file_name: &str, action: &str) {
        let path = &self.path;
        let line = format_record(
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            username,
            file_name,
            action,
        );

        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            // One write per record keeps concurrent appends from interleaving
            file.write_all(line.as_bytes()).await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write action log {}: {}", path.display(), e);
        }
    }
}

fn format_record(timestamp: &str, username: &str, file_name: &str, action: &str) -> String {
    format!("{timestamp} | User: {username} | File: {file_name} | Action: {action}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_format() {
        assert_eq!(
            format_record("2024-01-02 03:04:05", "alice", "a.txt", "created"),
            "2024-01-02 03:04:05 | User: alice | File: a.txt | Action: created\n"
        );
    }

    #[tokio::test]
    async fn test_records_are_appended() {
        let dir = TempDir::new().unwrap();
        let log = ActionLog::new(dir.path().join("actions.log"));
        log.record("alice", "a.txt", "created").await;
        log.record("alice", "demo", "project deleted").await;

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| User: alice | File: a.txt | Action: created"));
        assert!(lines[1].ends_with("| Action: project deleted"));
    }
}
