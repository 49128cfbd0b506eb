// ABOUTME: Thin interactive client that relays terminal lines and drives uploads and downloads
// Server text goes to the output as it arrives; transfer markers switch the stream to binary frames

use crate::models::FileEntry;
use crate::session::menu::{
    RECEIVING_FILE, RECEIVING_PROJECT, SENDING_FILE, SENDING_PROJECT, UPLOAD_FILE_PROMPT,
    UPLOAD_PROJECT_PROMPT,
};
use crate::store::WorkspaceStore;
use crate::transfer::{receive_file, receive_tree, send_file, send_tree, walk};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the next terminal line means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Relay,
    ProjectPath,
    FilePath,
}

enum ServerOutput {
    Line(Vec<u8>),
    Fragment(Vec<u8>),
    Closed,
}

/// Next complete line, or whatever partial text is buffered (prompts have no newline)
async fn next_output<R>(reader: &mut R) -> std::io::Result<ServerOutput>
where
    R: AsyncBufRead + Unpin,
{
    let buf = reader.fill_buf().await?;
    if buf.is_empty() {
        return Ok(ServerOutput::Closed);
    }
    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line = buf[..=pos].to_vec();
        reader.consume(pos + 1);
        Ok(ServerOutput::Line(line))
    } else {
        let fragment = buf.to_vec();
        reader.consume(fragment.len());
        Ok(ServerOutput::Fragment(fragment))
    }
}

pub struct Client<R, W, O> {
    reader: R,
    writer: W,
    output: O,
    downloads: WorkspaceStore,
    chunk_size: usize,
    mode: InputMode,
    partial: Vec<u8>,
    pending_project: Option<PathBuf>,
    pending_file: Option<PathBuf>,
}

impl<R, W, O> Client<R, W, O>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    O: AsyncWrite + Unpin,
{
    /// `download_dir` receives downloaded projects and files
    pub fn new(reader: R, writer: W, output: O, download_dir: &Path, chunk_size: usize) -> Self {
        Self {
            reader,
            writer,
            output,
            downloads: WorkspaceStore::new(download_dir),
            chunk_size,
            mode: InputMode::Relay,
            partial: Vec::new(),
            pending_project: None,
            pending_file: None,
        }
    }

    /// Relay until the server closes the connection. Lines from `input` are
    /// sent as they come; a closed input channel stops relaying but keeps
    /// printing server output.
    pub async fn run(mut self, mut input: mpsc::Receiver<String>) -> Result<()> {
        let mut input_open = true;
        loop {
            tokio::select! {
                output = next_output(&mut self.reader) => {
                    match output.context("Failed to read from server")? {
                        ServerOutput::Closed => break,
                        ServerOutput::Fragment(bytes) => self.on_fragment(bytes).await?,
                        ServerOutput::Line(bytes) => self.on_line(bytes).await?,
                    }
                }
                line = input.recv(), if input_open => match line {
                    Some(line) => self.on_input(line).await?,
                    None => input_open = false,
                },
            }
        }
        self.output.flush().await?;
        info!("Server closed the connection");
        Ok(())
    }

    async fn print(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes).await?;
        self.output.flush().await?;
        Ok(())
    }

    async fn on_fragment(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.print(&bytes).await?;
        self.partial.extend_from_slice(&bytes);
        let text = String::from_utf8_lossy(&self.partial).into_owned();
        if text.ends_with(UPLOAD_PROJECT_PROMPT) {
            self.mode = InputMode::ProjectPath;
            self.print(b"(local directory) ").await?;
        } else if text.ends_with(UPLOAD_FILE_PROMPT) {
            self.mode = InputMode::FilePath;
            self.print(b"(local file) ").await?;
        }
        Ok(())
    }

    async fn on_line(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.print(&bytes).await?;
        self.partial.extend_from_slice(&bytes);
        let line = String::from_utf8_lossy(&self.partial).trim_end().to_string();
        self.partial.clear();

        if let Some(name) = line.strip_prefix(RECEIVING_PROJECT) {
            self.upload_project(name).await
        } else if let Some(name) = line.strip_prefix(RECEIVING_FILE) {
            self.upload_file(name).await
        } else if let Some(name) = line.strip_prefix(SENDING_PROJECT) {
            self.download_project(name).await
        } else if let Some(name) = line.strip_prefix(SENDING_FILE) {
            self.download_file(name).await
        } else {
            Ok(())
        }
    }

    async fn on_input(&mut self, line: String) -> Result<()> {
        // The prompt has been answered; whatever the server says next starts a new line
        self.partial.clear();
        let mode = std::mem::replace(&mut self.mode, InputMode::Relay);
        let reply = match mode {
            InputMode::Relay => line,
            InputMode::ProjectPath => {
                let path = PathBuf::from(line.trim());
                if path.is_dir() {
                    let name = upload_name(&path);
                    self.pending_project = Some(path);
                    name
                } else {
                    self.print(b"Not a directory, upload cancelled\n").await?;
                    String::new()
                }
            }
            InputMode::FilePath => {
                let path = PathBuf::from(line.trim());
                if path.is_file() {
                    let name = upload_name(&path);
                    self.pending_file = Some(path);
                    name
                } else {
                    self.print(b"Not a file, upload cancelled\n").await?;
                    String::new()
                }
            }
        };
        self.writer.write_all(format!("{reply}\n").as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn upload_project(&mut self, name: &str) -> Result<()> {
        let Some(root) = self.pending_project.take() else {
            // The server is waiting for a tree; an empty one keeps the stream in step
            warn!("No local directory selected for project {}", name);
            let nothing: Vec<std::io::Result<FileEntry>> = Vec::new();
            send_tree(&mut self.writer, Path::new("."), nothing, self.chunk_size).await?;
            return Ok(());
        };
        let walk_root = root.clone();
        let entries = tokio::task::spawn_blocking(move || walk(walk_root).collect::<Vec<_>>())
            .await
            .context("Directory walk failed")?;
        let summary = send_tree(&mut self.writer, &root, entries, self.chunk_size)
            .await
            .with_context(|| format!("Failed to upload {}", root.display()))?;
        debug!("Uploaded {}: {:?}", root.display(), summary);
        Ok(())
    }

    async fn upload_file(&mut self, name: &str) -> Result<()> {
        let Some(path) = self.pending_file.take() else {
            warn!("No local file selected for {}", name);
            self.writer.write_u32(0).await?;
            self.writer.flush().await?;
            return Ok(());
        };
        send_file(&mut self.writer, &path, self.chunk_size)
            .await
            .with_context(|| format!("Failed to upload {}", path.display()))?;
        Ok(())
    }

    async fn download_project(&mut self, name: &str) -> Result<()> {
        let summary = receive_tree(
            &mut self.reader,
            &self.downloads,
            Path::new(name),
            self.chunk_size,
        )
        .await
        .with_context(|| format!("Failed to download project {name}"))?;
        let target = self.downloads.root().join(name);
        self.print(
            format!(
                "Saved {} files and {} directories to {}\n",
                summary.files,
                summary.directories,
                target.display()
            )
            .as_bytes(),
        )
        .await
    }

    async fn download_file(&mut self, name: &str) -> Result<()> {
        let bytes = receive_file(
            &mut self.reader,
            &self.downloads,
            Path::new(name),
            self.chunk_size,
        )
        .await
        .with_context(|| format!("Failed to download file {name}"))?;
        let target = self.downloads.root().join(name);
        self.print(format!("Saved {} bytes to {}\n", bytes, target.display()).as_bytes())
            .await
    }
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Connect to `addr` and relay the terminal until the server hangs up
pub async fn connect(addr: &str, download_dir: &Path, chunk_size: usize) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    info!("Connected to {}", addr);
    let (read_half, write_half) = stream.into_split();

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read terminal input: {}", e);
                    break;
                }
            }
        }
    });

    Client::new(
        BufReader::new(read_half),
        write_half,
        tokio::io::stdout(),
        download_dir,
        chunk_size,
    )
    .run(rx)
    .await
}
