//! Transport layer between the host and the interpreter.
//!
//! Provides:
//! - Wire messages (`Message`, `Command`) encoded as msgpack maps
//! - Length-prefixed framing with a payload size limit
//! - `FramedChannel` over any async byte stream
//! - `Endpoint` naming and the local listener the child connects to

pub mod channel;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use channel::FramedChannel;
pub use codec::FrameConfig;
pub use endpoint::{Endpoint, EndpointName};
pub use error::{ChannelError, FrameError};
pub use message::{Command, Message};
