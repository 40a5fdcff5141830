//! Abstractions over external processes.

pub mod command;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
