// ABOUTME: Per-connection session handling: line framing, menus and the state machine engine

pub mod connection;
pub mod engine;
pub mod menu;

pub use connection::Connection;
pub use engine::{SessionContext, SessionEngine};
pub use menu::{Confirmation, MainCommand, MenuCommand, ProjectCommand, WelcomeCommand};
