// ABOUTME: Buffered client connection shared by menu text and binary transfers
// Text commands end at a newline or at the end of a received chunk; transfer frames continue on the same buffer

use crate::error::SessionError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Longest accepted command; longer input is split into several commands
pub const MAX_LINE_LEN: usize = 4096;

pub struct Connection<S> {
    stream: BufReader<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Read one command. A buffered `\n` ends it; without one, whatever
    /// the peer has sent so far is the command, so clients that send bare
    /// newline-free commands are served too. Trailing `\n`/`\r\n` is
    /// removed; zero bytes means the peer closed the connection.
    pub async fn read_line(&mut self) -> Result<String, SessionError> {
        let buf = self.stream.fill_buf().await?;
        if buf.is_empty() {
            return Err(SessionError::Disconnected);
        }
        let len = match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => buf.len(),
        }
        .min(MAX_LINE_LEN);
        let mut raw = buf[..len].to_vec();
        self.stream.consume(len);

        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Read a line and trim surrounding whitespace
    pub async fn read_trimmed(&mut self) -> Result<String, SessionError> {
        Ok(self.read_line().await?.trim().to_string())
    }

    pub async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_bytes(text.as_bytes()).await
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let writer = self.stream.get_mut();
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write a prompt and read the answer
    pub async fn prompt(&mut self, text: &str) -> Result<String, SessionError> {
        self.send(text).await?;
        self.read_trimmed().await
    }

    /// Buffered stream for binary transfer frames
    pub fn stream_mut(&mut self) -> &mut BufReader<S> {
        &mut self.stream
    }

    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }
}
