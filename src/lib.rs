// ABOUTME: Library crate for Workspace Hub exposing the server, session engine and client for testing and reuse

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod session;
pub mod store;
pub mod transfer;
pub mod tunnel;
