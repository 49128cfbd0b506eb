// ABOUTME: End-to-end session tests over TCP: registration, projects, uploads and downloads

mod common;

use common::{start_server, TestClient};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use workspace_hub::store::WorkspaceStore;
use workspace_hub::transfer::{receive_tree, send_tree, walk};

/// Register, log in, create a project, upload a tree and list its files
#[tokio::test]
async fn test_register_login_upload_and_list() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;

    assert_eq!(
        client.register("alice", "secret1").await,
        "Registration successful!\n"
    );
    assert_eq!(client.login("alice", "secret1").await, "Login successful!\n");
    client.create_project("demo").await;

    // Two files, one of them inside a subdirectory
    let local = TempDir::new().unwrap();
    std::fs::create_dir(local.path().join("src")).unwrap();
    std::fs::write(local.path().join("readme.md"), "# demo\n").unwrap();
    std::fs::write(local.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();

    client.choose("5").await;
    client.expect("Enter project name to upload: ").await;
    client.send("demo").await;
    client.expect("Receiving project demo\n").await;
    let entries: Vec<_> = walk(local.path()).collect();
    send_tree(&mut client.stream, local.path(), entries, 64)
        .await
        .unwrap();
    client.expect("Project uploaded successfully.").await;

    client.choose("3").await;
    client.send("demo").await;
    client.expect("Opened project demo\n").await;

    client.choose("a").await;
    assert_eq!(
        client.expect("Project Menu:").await,
        "Files:\n- readme.md\nProject Menu:"
    );

    let project = server.workspaces.join("alice/demo");
    assert_eq!(
        std::fs::read_to_string(project.join("src/lib.rs")).unwrap(),
        "pub fn answer() -> u32 { 42 }\n"
    );

    client.choose("g").await;
    client.choose("8").await;
    client.expect("Logging out...").await;
    assert!(client.is_closed().await);

    let log = std::fs::read_to_string(dir.path().join("version_log.txt")).unwrap();
    assert!(log.contains("User: alice | File: demo | Action: Uploaded project"));
}

/// Clients that send bare commands without a line ending are answered too
#[tokio::test]
async fn test_newline_free_commands_drive_the_session() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;

    client.expect("Enter your choice: ").await;
    client.send_raw(b"2").await;
    client.expect("Enter username: ").await;
    client.send_raw(b"carol").await;
    client.expect("Enter password: ").await;
    client.send_raw(b"pw").await;
    assert_eq!(client.expect("\n").await, "Registration successful!\n");

    client.expect("Enter your choice: ").await;
    client.send_raw(b"3").await;
    client.expect("Enter username: ").await;
    client.send_raw(b"carol").await;
    client.expect("Enter password: ").await;
    client.send_raw(b"pw").await;
    assert_eq!(client.expect("\n").await, "Login successful!\n");

    client.expect("Enter your choice: ").await;
    client.send_raw(b"8").await;
    client.expect("Logging out...").await;
    assert!(client.is_closed().await);

    server.shutdown.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;

    client.register("bob", "right").await;
    assert_eq!(
        client.register("bob", "again").await,
        "Username already exists\n"
    );
    assert_eq!(
        client.login("bob", "wrong").await,
        "Invalid username or password\n"
    );
    assert_eq!(client.login("bob", "right").await, "Login successful!\n");
}

#[tokio::test]
async fn test_deleted_project_is_gone() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;
    client.register("carol", "pw").await;
    client.login("carol", "pw").await;
    client.create_project("old").await;
    std::fs::create_dir_all(server.workspaces.join("carol/old/a/b")).unwrap();
    std::fs::write(server.workspaces.join("carol/old/a/b/f.txt"), "x").unwrap();

    client.choose("4").await;
    client.send("old").await;
    client.expect("(yes/no): ").await;
    client.send("yes").await;
    client.expect("Project deleted successfully.").await;
    assert!(!server.workspaces.join("carol/old").exists());

    client.choose("3").await;
    client.send("old").await;
    client.expect("Project does not exist").await;

    client.choose("4").await;
    client.send("old").await;
    client.expect("Project does not exist").await;

    client.choose("1").await;
    client.expect("No projects found.").await;
}

#[tokio::test]
async fn test_project_download_reproduces_tree() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;
    client.register("dan", "pw").await;
    client.login("dan", "pw").await;

    let project = server.workspaces.join("dan/site");
    std::fs::create_dir_all(project.join("assets/img")).unwrap();
    std::fs::write(project.join("index.html"), "<html></html>").unwrap();
    std::fs::write(project.join("assets/img/logo.svg"), vec![b'x'; 1000]).unwrap();

    client.choose("6").await;
    client.expect("Enter project name to download: ").await;
    client.send("site").await;
    client.expect("Sending project site\n").await;

    let buffered = std::mem::take(&mut client.pending);
    let mut reader = BufReader::new((&buffered[..]).chain(&mut client.stream));
    let local = TempDir::new().unwrap();
    let store = WorkspaceStore::new(local.path());
    let summary = receive_tree(&mut reader, &store, Path::new("site"), 256)
        .await
        .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.directories, 2);
    assert_eq!(
        std::fs::read(local.path().join("site/assets/img/logo.svg")).unwrap(),
        vec![b'x'; 1000]
    );
    assert_eq!(
        std::fs::read_to_string(local.path().join("site/index.html")).unwrap(),
        "<html></html>"
    );
}

#[tokio::test]
async fn test_single_file_upload_and_download() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;
    client.register("eve", "pw").await;
    client.login("eve", "pw").await;
    client.create_project("bin").await;
    client.choose("3").await;
    client.send("bin").await;

    let payload: Vec<u8> = (0..=255u8).cycle().take(700).collect();
    client.choose("d").await;
    client.expect("Enter file name to upload: ").await;
    client.send("blob.dat").await;
    client.expect("Receiving file blob.dat\n").await;
    client
        .stream
        .write_all(&u32::try_from(payload.len()).unwrap().to_be_bytes())
        .await
        .unwrap();
    client.stream.write_all(&payload).await.unwrap();
    client.expect("File uploaded successfully.").await;

    client.choose("e").await;
    client.expect("Enter file name to download: ").await;
    client.send("blob.dat").await;
    client.expect("Sending file blob.dat\n").await;
    let size = client.read_bytes(4).await;
    assert_eq!(u32::from_be_bytes([size[0], size[1], size[2], size[3]]), 700);
    assert_eq!(client.read_bytes(700).await, payload);

    client.choose("e").await;
    client.send("missing.dat").await;
    client.expect("File does not exist").await;
}

/// A declared size larger than what arrives ends the session instead of hanging
#[tokio::test]
async fn test_truncated_upload_terminates_session() {
    let dir = TempDir::new().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = TestClient::connect(server.addr).await;
    client.register("frank", "pw").await;
    client.login("frank", "pw").await;

    client.choose("5").await;
    client.send("partial").await;
    client.expect("Receiving project partial\n").await;

    let mut wire = b"\x01big.bin\x00".to_vec();
    wire.extend_from_slice(&100u32.to_be_bytes());
    wire.extend_from_slice(&[7u8; 10]);
    client.stream.write_all(&wire).await.unwrap();
    client.stream.shutdown().await.unwrap();

    client.expect("Transfer failed").await;
    assert!(client.is_closed().await);
}
