//! Supervisor errors.

use std::path::PathBuf;

use pybridge_transport::ChannelError;
use thiserror::Error;

use crate::command::CommandBuildError;

/// Error starting or supervising the interpreter child.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Interpreter process already started")]
    AlreadyStarted,
    #[error("Interpreter process has been disposed")]
    Disposed,
    #[error("Interpreter not found: {}", .path.display())]
    ChildNotFound { path: PathBuf },
    #[error("Invalid launch command: {0}")]
    CommandBuild(#[from] CommandBuildError),
    #[error("Failed to spawn interpreter: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("Failed to open endpoint: {0}")]
    Endpoint(#[source] std::io::Error),
    #[error("Handshake mismatch: expected ready from pid {expected}, got {received}")]
    HandshakeMismatch { expected: u32, received: String },
    #[error("Interpreter exited before connecting (status: {status})")]
    ChildExited { status: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
