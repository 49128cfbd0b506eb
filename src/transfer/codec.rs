// ABOUTME: Wire codec for recursive tree transfers over an already-open byte stream
// Entries are {tag:u8, path:cstring[, size:u32 BE, payload]} ending with a terminator tag

use crate::error::ProtocolError;
use crate::models::{sanitize_relative, EntryKind, FileEntry};
use crate::store::WorkspaceStore;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

pub const TAG_TERMINATOR: u8 = 0;
pub const TAG_REGULAR: u8 = 1;
pub const TAG_DIRECTORY: u8 = 2;

/// Longest accepted path, excluding the NUL terminator
pub const MAX_PATH_LEN: usize = 4096;

/// Header of one wire record. Payload bytes of a `Regular` entry follow the
/// header on the stream and are not part of this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEntry {
    Terminator,
    Regular { path: PathBuf, size: u32 },
    Directory { path: PathBuf },
}

impl TransferEntry {
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Terminator => TAG_TERMINATOR,
            Self::Regular { .. } => TAG_REGULAR,
            Self::Directory { .. } => TAG_DIRECTORY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Render a relative path with `/` separators for the wire
fn wire_path(path: &Path) -> Result<String, ProtocolError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| ProtocolError::InvalidPath(path.display().to_string()))?,
            ),
            Component::CurDir => {}
            _ => return Err(ProtocolError::InvalidPath(path.display().to_string())),
        }
    }
    if parts.is_empty() {
        return Err(ProtocolError::InvalidPath(path.display().to_string()));
    }
    let joined = parts.join("/");
    if joined.len() > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong(MAX_PATH_LEN));
    }
    Ok(joined)
}

fn aborted(expected: u64, received: u64) -> ProtocolError {
    ProtocolError::TransferAborted { expected, received }
}

pub async fn write_entry_header<W>(writer: &mut W, entry: &TransferEntry) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(entry.tag()).await?;
    match entry {
        TransferEntry::Terminator => {}
        TransferEntry::Directory { path } => {
            writer.write_all(wire_path(path)?.as_bytes()).await?;
            writer.write_u8(0).await?;
        }
        TransferEntry::Regular { path, size } => {
            writer.write_all(wire_path(path)?.as_bytes()).await?;
            writer.write_u8(0).await?;
            writer.write_u32(*size).await?;
        }
    }
    Ok(())
}

async fn read_path<R>(reader: &mut R) -> Result<PathBuf, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let limit = (MAX_PATH_LEN + 1) as u64;
    (&mut *reader).take(limit).read_until(0, &mut raw).await?;

    if raw.last() != Some(&0) {
        if raw.len() as u64 >= limit {
            return Err(ProtocolError::PathTooLong(MAX_PATH_LEN));
        }
        return Err(aborted(raw.len() as u64 + 1, raw.len() as u64));
    }
    raw.pop();

    let text = String::from_utf8(raw)
        .map_err(|e| ProtocolError::InvalidPath(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    // Traversal is rejected here, before anything is created or written
    sanitize_relative(Path::new(&text)).ok_or(ProtocolError::InvalidPath(text))
}

/// Read one entry header. Paths come back already validated as relative and
/// free of parent-directory segments.
pub async fn read_entry_header<R>(reader: &mut R) -> Result<TransferEntry, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(aborted(1, 0)),
        Err(e) => return Err(e.into()),
    };

    match tag {
        TAG_TERMINATOR => Ok(TransferEntry::Terminator),
        TAG_DIRECTORY => Ok(TransferEntry::Directory {
            path: read_path(reader).await?,
        }),
        TAG_REGULAR => {
            let path = read_path(reader).await?;
            let size = read_size(reader).await?;
            Ok(TransferEntry::Regular { path, size })
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

/// Read the 4-byte network-order size field
pub async fn read_size<R>(reader: &mut R) -> Result<u32, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(aborted(4, filled as u64));
        }
        filled += n;
    }
    Ok(u32::from_be_bytes(buf))
}

/// Copy exactly `size` bytes from `reader` to `writer` in chunks of at most
/// `chunk_size`. A stream that ends early yields `TransferAborted`; nothing
/// beyond `size` is ever consumed.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied = 0u64;
    while copied < size {
        let want = usize::try_from(size - copied).map_or(buf.len(), |rest| rest.min(buf.len()));
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(aborted(size, copied));
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
    writer.flush().await?;
    Ok(copied)
}

fn transfer_size(len: u64) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::FileTooLarge(len))
}

/// Write a bare `size + payload` frame for a single local file
pub async fn send_file<W>(writer: &mut W, source: &Path, chunk_size: usize) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(source).await?;
    let size = transfer_size(file.metadata().await?.len())?;
    writer.write_u32(size).await?;
    let sent = copy_exact(&mut file, writer, u64::from(size), chunk_size).await?;
    debug!("Sent file {} ({} bytes)", source.display(), sent);
    Ok(sent)
}

/// Send a store file as a bare `size + payload` frame
pub async fn send_store_file<W>(
    writer: &mut W,
    store: &WorkspaceStore,
    relative: &Path,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let (mut file, len) = store.open_reader(relative).await?;
    let size = transfer_size(len)?;
    writer.write_u32(size).await?;
    copy_exact(&mut file, writer, u64::from(size), chunk_size).await
}

/// Read a bare `size + payload` frame into a fresh or truncated store file
pub async fn receive_file<R>(
    reader: &mut R,
    store: &WorkspaceStore,
    target: &Path,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let size = read_size(reader).await?;
    let mut file = store.open_writer(target).await?;
    let received = copy_exact(reader, &mut file, u64::from(size), chunk_size).await?;
    debug!("Received file {} ({} bytes)", target.display(), received);
    Ok(received)
}

/// Send role: emit every entry of `entries` (paths relative to `root`), then a
/// terminator. Directory entries carry no length; regular entries carry the
/// file's size followed by exactly that many bytes.
pub async fn send_tree<W, I>(
    writer: &mut W,
    root: &Path,
    entries: I,
    chunk_size: usize,
) -> Result<TransferSummary, ProtocolError>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = io::Result<FileEntry>>,
{
    let mut summary = TransferSummary::default();
    for entry in entries {
        let entry = entry?;
        match entry.kind {
            EntryKind::Directory => {
                write_entry_header(
                    writer,
                    &TransferEntry::Directory {
                        path: entry.relative_path,
                    },
                )
                .await?;
                summary.directories += 1;
            }
            EntryKind::Regular => {
                let mut file = tokio::fs::File::open(root.join(&entry.relative_path)).await?;
                let size = transfer_size(file.metadata().await?.len())?;
                write_entry_header(
                    writer,
                    &TransferEntry::Regular {
                        path: entry.relative_path,
                        size,
                    },
                )
                .await?;
                summary.bytes += copy_exact(&mut file, writer, u64::from(size), chunk_size).await?;
                summary.files += 1;
            }
        }
    }
    write_entry_header(writer, &TransferEntry::Terminator).await?;
    writer.flush().await?;
    info!(
        "Sent tree {}: {} files, {} directories, {} bytes",
        root.display(),
        summary.files,
        summary.directories,
        summary.bytes
    );
    Ok(summary)
}

/// Receive role: apply entries under the store-relative `target` until the
/// terminator arrives. Files are truncated, never appended, so re-sending the
/// same tree reproduces the same contents.
pub async fn receive_tree<R>(
    reader: &mut R,
    store: &WorkspaceStore,
    target: &Path,
    chunk_size: usize,
) -> Result<TransferSummary, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    store.ensure_dir(target).await?;
    let mut summary = TransferSummary::default();
    loop {
        match read_entry_header(reader).await? {
            TransferEntry::Terminator => break,
            TransferEntry::Directory { path } => {
                store.ensure_dir(&target.join(path)).await?;
                summary.directories += 1;
            }
            TransferEntry::Regular { path, size } => {
                let mut file = store.open_writer(&target.join(&path)).await?;
                summary.bytes += copy_exact(reader, &mut file, u64::from(size), chunk_size).await?;
                summary.files += 1;
            }
        }
    }
    info!(
        "Received tree into {}: {} files, {} directories, {} bytes",
        target.display(),
        summary.files,
        summary.directories,
        summary.bytes
    );
    Ok(summary)
}
