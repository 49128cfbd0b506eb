// ABOUTME: Tests for the recursive tree transfer codec: round trips, re-uploads and truncated streams

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, BufReader};
use workspace_hub::error::ProtocolError;
use workspace_hub::models::FileEntry;
use workspace_hub::store::WorkspaceStore;
use workspace_hub::transfer::{receive_tree, send_tree, walk, TAG_TERMINATOR};

/// Relative path -> contents (None for directories)
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    walk(root)
        .map(|entry| {
            let entry = entry.unwrap();
            let contents = if entry.is_dir() {
                None
            } else {
                Some(std::fs::read(root.join(&entry.relative_path)).unwrap())
            };
            (entry.relative_path, contents)
        })
        .collect()
}

fn build_nested_tree(root: &Path) {
    std::fs::create_dir_all(root.join("a/b/c/d")).unwrap();
    std::fs::create_dir_all(root.join("empty")).unwrap();
    std::fs::write(root.join("top.txt"), "top").unwrap();
    std::fs::write(root.join("a/one.txt"), "one").unwrap();
    std::fs::write(root.join("a/b/c/d/deep.bin"), vec![0xAB; 5000]).unwrap();
    std::fs::write(root.join("a/b/zero"), "").unwrap();
}

async fn transfer(source: &Path, store: &WorkspaceStore, target: &Path) {
    let (mut sender, receiver) = tokio::io::duplex(1024);
    let mut receiver = BufReader::new(receiver);
    let entries: Vec<_> = walk(source).collect();

    let (sent, received) = tokio::join!(
        send_tree(&mut sender, source, entries, 300),
        receive_tree(&mut receiver, store, target, 700),
    );
    let sent = sent.unwrap();
    let received = received.unwrap();
    assert_eq!(sent, received);
}

#[tokio::test]
async fn test_nested_tree_round_trip() {
    let source = TempDir::new().unwrap();
    build_nested_tree(source.path());
    let dest = TempDir::new().unwrap();
    let store = WorkspaceStore::new(dest.path());

    transfer(source.path(), &store, Path::new("user/proj")).await;

    assert_eq!(
        snapshot(source.path()),
        snapshot(&dest.path().join("user/proj"))
    );
}

#[tokio::test]
async fn test_reupload_truncates_instead_of_appending() {
    let source = TempDir::new().unwrap();
    build_nested_tree(source.path());
    let dest = TempDir::new().unwrap();
    let store = WorkspaceStore::new(dest.path());

    transfer(source.path(), &store, Path::new("proj")).await;
    transfer(source.path(), &store, Path::new("proj")).await;

    assert_eq!(
        std::fs::read_to_string(dest.path().join("proj/top.txt")).unwrap(),
        "top"
    );
    assert_eq!(snapshot(source.path()), snapshot(&dest.path().join("proj")));
}

#[tokio::test]
async fn test_in_memory_tree_encoding() {
    let source = TempDir::new().unwrap();
    std::fs::create_dir(source.path().join("d")).unwrap();
    std::fs::write(source.path().join("d/f"), "hey").unwrap();

    let entries = vec![
        Ok(FileEntry::directory("d")),
        Ok(FileEntry::regular("d/f")),
    ];
    let mut wire = Vec::new();
    let summary = send_tree(&mut wire, source.path(), entries, 2)
        .await
        .unwrap();

    assert_eq!(summary.files, 1);
    assert_eq!(summary.directories, 1);
    let mut expected = b"\x02d\x00\x01d/f\x00\x00\x00\x00\x03hey".to_vec();
    expected.push(TAG_TERMINATOR);
    assert_eq!(wire, expected);
}

#[tokio::test]
async fn test_size_mismatch_aborts_without_hanging() {
    let dest = TempDir::new().unwrap();
    let store = WorkspaceStore::new(dest.path());
    let (mut sender, receiver) = tokio::io::duplex(1024);
    let mut receiver = BufReader::new(receiver);

    let mut wire = b"\x01file\x00".to_vec();
    wire.extend_from_slice(&64u32.to_be_bytes());
    wire.extend_from_slice(b"only a few bytes");
    sender.write_all(&wire).await.unwrap();
    drop(sender);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        receive_tree(&mut receiver, &store, Path::new("p"), 8),
    )
    .await
    .expect("receiver hung on a short stream");

    assert!(matches!(
        result,
        Err(ProtocolError::TransferAborted {
            expected: 64,
            received: 16
        })
    ));
}

#[tokio::test]
async fn test_missing_terminator_aborts() {
    let dest = TempDir::new().unwrap();
    let store = WorkspaceStore::new(dest.path());
    let mut wire: &[u8] = b"\x02dir\x00";

    let result = receive_tree(&mut wire, &store, Path::new("p"), 8).await;
    assert!(matches!(
        result,
        Err(ProtocolError::TransferAborted { .. })
    ));
    assert!(dest.path().join("p/dir").is_dir());
}

#[tokio::test]
async fn test_traversal_entry_writes_nothing() {
    let dest = TempDir::new().unwrap();
    let store = WorkspaceStore::new(dest.path().join("root"));
    let mut wire: &[u8] = b"\x01../../escape\x00\x00\x00\x00\x01x\x00";

    let result = receive_tree(&mut wire, &store, Path::new("p"), 8).await;
    assert!(matches!(result, Err(ProtocolError::InvalidPath(_))));
    assert!(!dest.path().join("escape").exists());
}
