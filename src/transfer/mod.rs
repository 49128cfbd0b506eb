// ABOUTME: Recursive file tree transfer protocol
// Tree traversal is kept apart from the wire codec so each can be tested alone

pub mod codec;
pub mod tree;

pub use codec::{
    copy_exact, read_entry_header, receive_file, receive_tree, send_file, send_store_file,
    send_tree, write_entry_header, TransferEntry, TransferSummary, MAX_PATH_LEN, TAG_DIRECTORY,
    TAG_REGULAR, TAG_TERMINATOR,
};
pub use tree::{walk, TreeWalk};
