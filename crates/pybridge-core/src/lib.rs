//! Core building blocks for driving a child Python interpreter.
//!
//! This crate provides:
//! - `Primitive` - Host-local representation of interpreter values
//! - `IntoPrimitive` / `FromPrimitive` - Conversions between Rust types and `Primitive`
//! - `RemoteException` / `HostError` - Exception records exchanged with the interpreter
//! - Identifier validation for names bound into the interpreter

pub mod convert;
pub mod error;
pub mod exception;
pub mod ident;
pub mod value;

mod stack;

pub use convert::{FromPrimitive, IntoPrimitive};
pub use error::ConversionError;
pub use exception::{
    ErrorPayload, ExceptionKind, HOST_EXCEPTION_BUCKET, HostError, RemoteException, TracebackFrame,
};
pub use ident::is_identifier;
pub use value::{PyMap, PySet, Primitive, Record};
