// ABOUTME: Shared helpers for integration tests: a real TCP server and a scripted line client

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use workspace_hub::config::ServerConfig;
use workspace_hub::server::{build_context, Server};

pub const CHOICE_PROMPT: &str = "Enter your choice: ";

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
    pub workspaces: PathBuf,
}

/// Start a server on an ephemeral port with every file under `dir`
pub async fn start_server(dir: &Path) -> TestServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        workspaces_root: dir.join("workspaces"),
        database_path: dir.join("users.db"),
        action_log_path: dir.join("version_log.txt"),
        shutdown_grace_secs: 1,
        chunk_size: 128,
        ..ServerConfig::default()
    };
    let ctx = build_context(&config).await.expect("Failed to build context");
    let server = Server::bind(config.bind_addr, ctx, config.shutdown_grace())
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    TestServer {
        addr,
        shutdown,
        handle,
        workspaces: config.workspaces_root,
    }
}

pub struct TestClient {
    pub stream: TcpStream,
    pub pending: Vec<u8>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Write bytes as they are, with no line ending added
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Read until `needle` appears; returns the text up to and including it
    pub async fn expect(&mut self, needle: &str) -> String {
        tokio::time::timeout(Duration::from_secs(10), self.read_until(needle))
            .await
            .unwrap_or_else(|_| {
                panic!(
                    "timed out waiting for {needle:?}; buffered {:?}",
                    String::from_utf8_lossy(&self.pending)
                )
            })
    }

    async fn read_until(&mut self, needle: &str) -> String {
        loop {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            if let Some(pos) = text.find(needle) {
                let end = pos + needle.len();
                self.pending.drain(..end);
                return text[..end].to_string();
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed while waiting for {needle:?}; got {text:?}");
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Take exactly `n` raw bytes, buffered ones first
    pub async fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        while self.pending.len() < n {
            let mut buf = [0u8; 4096];
            let read = self.stream.read(&mut buf).await.unwrap();
            assert!(read > 0, "server closed before {n} bytes arrived");
            self.pending.extend_from_slice(&buf[..read]);
        }
        self.pending.drain(..n).collect()
    }

    /// True once the server has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(Duration::from_secs(10), self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(n)) => self.pending.extend_from_slice(&buf[..n]),
                Err(_) => return false,
            }
        }
    }

    /// Answer a menu prompt with `choice`
    pub async fn choose(&mut self, choice: &str) {
        self.expect(CHOICE_PROMPT).await;
        self.send(choice).await;
    }

    pub async fn register(&mut self, user: &str, password: &str) -> String {
        self.choose("2").await;
        self.expect("Enter username: ").await;
        self.send(user).await;
        self.expect("Enter password: ").await;
        self.send(password).await;
        self.expect("\n").await
    }

    pub async fn login(&mut self, user: &str, password: &str) -> String {
        self.choose("3").await;
        self.expect("Enter username: ").await;
        self.send(user).await;
        self.expect("Enter password: ").await;
        self.send(password).await;
        self.expect("\n").await
    }

    pub async fn create_project(&mut self, name: &str) {
        self.choose("2").await;
        self.expect("Enter project name: ").await;
        self.send(name).await;
        self.expect("Project created successfully.").await;
    }
}
