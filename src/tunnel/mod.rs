// ABOUTME: Remote command execution scoped to a user's workspace

pub mod command;

pub use command::{CommandOutput, CommandTunnel, TunnelError, TunnelInput};
