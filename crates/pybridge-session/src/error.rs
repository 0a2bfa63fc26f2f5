//! Session errors.

use std::path::PathBuf;

use pybridge_core::{ConversionError, HostError, RemoteException};
use pybridge_process::ProcessError;
use pybridge_transport::{ChannelError, FrameError};
use thiserror::Error;

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Session has not been started")]
    NotStarted,
    #[error("Session has been disposed")]
    Disposed,
    #[error("Interpreter not found: {}", .path.display())]
    ChildNotFound { path: PathBuf },
    #[error("Handshake mismatch: {0}")]
    HandshakeMismatch(String),
    #[error("Interpreter process exited")]
    ChildExited,
    #[error("Payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Payload cannot be encoded: {0}")]
    Unencodable(String),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("{0}")]
    Remote(RemoteException),
    #[error("{0}")]
    Host(HostError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Remote value used after dispose")]
    UseAfterDispose,
    #[error("Values from different sessions cannot be combined")]
    CrossSession,
    #[error("Assignment target must be evaluated first")]
    RequiresEvaluationFirst,
    #[error("Values of type `{left}` and `{right}` are not comparable")]
    NotComparable {
        left: &'static str,
        right: &'static str,
    },
    #[error("`{0}` is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("Session is busy with another call")]
    Busy,
    #[error("No session given and no default session set")]
    NoDefaultSession,
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(#[source] ChannelError),
    #[error("Process error: {0}")]
    Process(#[source] ProcessError),
}

impl SessionError {
    /// Whether the session was torn down by this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ChildExited
                | Self::ProtocolViolation(_)
                | Self::Transport(_)
                | Self::Process(_)
                | Self::HandshakeMismatch(_)
                | Self::ChildNotFound { .. }
        )
    }

    /// The remote exception, if this error carries one.
    #[must_use]
    pub const fn as_remote(&self) -> Option<&RemoteException> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }

    /// The outbound side of a channel error. Oversized or unencodable
    /// payloads are never written, so the channel stays usable.
    pub(crate) fn from_send(error: ChannelError) -> Self {
        match error {
            ChannelError::Frame(FrameError::PayloadTooLarge { size, limit }) => {
                Self::PayloadTooLarge { size, limit }
            }
            ChannelError::Frame(FrameError::Encode(e)) => Self::Unencodable(e.to_string()),
            other => Self::from_channel(other),
        }
    }

    /// The inbound side of a channel error.
    pub(crate) fn from_channel(error: ChannelError) -> Self {
        match error {
            ChannelError::Closed => Self::ChildExited,
            ChannelError::Frame(e) => Self::ProtocolViolation(e.to_string()),
            io @ ChannelError::Io(_) => Self::Transport(io),
        }
    }
}

impl From<ProcessError> for SessionError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::AlreadyStarted => Self::AlreadyStarted,
            ProcessError::Disposed => Self::Disposed,
            ProcessError::ChildNotFound { path } => Self::ChildNotFound { path },
            ProcessError::HandshakeMismatch { expected, received } => {
                Self::HandshakeMismatch(format!("expected ready from pid {expected}, got {received}"))
            }
            ProcessError::ChildExited { .. } => Self::ChildExited,
            ProcessError::Channel(e) => Self::from_channel(e),
            other => Self::Process(other),
        }
    }
}

impl From<HostError> for SessionError {
    fn from(error: HostError) -> Self {
        Self::Host(error)
    }
}

impl From<RemoteException> for SessionError {
    fn from(error: RemoteException) -> Self {
        Self::Remote(error)
    }
}
