//! Interpreter process supervision.
//!
//! Provides:
//! - `LaunchMode` / `CommandBuilder` - Build the child command line
//! - `resolve_executable_path` - Locate interpreters and driver files
//! - `Launcher` - Seam for spawning the child (`ProcessLauncher` in production)
//! - `Supervisor` - Start, handshake and teardown of one child

pub mod command;
pub mod error;
pub mod launcher;
pub mod resolve;
pub mod supervisor;

pub use command::{CommandBuilder, CommandParts, LaunchMode};
pub use error::ProcessError;
pub use launcher::{ChildProcess, Launcher, ProcessLauncher};
pub use resolve::resolve_executable_path;
pub use supervisor::{Supervisor, SupervisorConfig};
