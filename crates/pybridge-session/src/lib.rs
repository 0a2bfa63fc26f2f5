//! Drive a child Python interpreter as if its values were local.
//!
//! Provides:
//! - `Session` - One interpreter child plus its protocol engine
//! - `Value` - Remote values: proxies, resolved values and unevaluated operations
//! - `SessionConfig` - Serde-backed launch and framing settings
//! - Host callables and generators the interpreter can call back into
//! - A process-wide default session for single-session programs

pub mod bindings;
pub mod config;
pub mod default;
pub mod error;
pub mod session;
pub mod value;

mod engine;
mod naming;
mod registry;

pub use bindings::{HostIterator, HostResult};
pub use config::SessionConfig;
pub use error::SessionError;
pub use pybridge_core::{
    ConversionError, ExceptionKind, FromPrimitive, HostError, IntoPrimitive, PyMap, PySet,
    Primitive, Record, RemoteException, TracebackFrame,
};
pub use pybridge_process::{LaunchMode, Launcher};
pub use session::Session;
pub use value::{BinaryOp, Operation, RemoteIter, UnaryOp, Value};
