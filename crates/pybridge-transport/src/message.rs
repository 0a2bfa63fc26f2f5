//! Wire messages.
//!
//! Every frame carries a string-keyed map with a `cm` command tag and, for
//! most commands, a `dt` payload. `call` adds `func`; generator calls and
//! `step` add `id`.

use pybridge_core::Primitive;
use serde::{Deserialize, Serialize};

/// Command tag of a wire message, sent as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Command {
    /// Child handshake; `dt` is the child pid.
    Ready,
    /// Run `dt` as statements.
    Exec,
    /// Evaluate `dt` and return the value as `res`.
    Eval,
    /// Child asks the host to invoke the bound callable `func`.
    Call,
    /// Host reply to `call`; `dt` is an expression the child evaluates.
    Retn,
    /// Child asks the host to advance generator `id`.
    Step,
    /// Host reply to `step` carrying the next value expression.
    Yld,
    /// Host reply to `step` when the generator is exhausted or unknown.
    Stop,
    /// An exception; `dt` is `[bucket, type, message, traceback]`.
    Err,
    /// Eager evaluation result.
    Res,
    /// Statements completed.
    Done,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Exec => "exec",
            Self::Eval => "eval",
            Self::Call => "call",
            Self::Retn => "retn",
            Self::Step => "step",
            Self::Yld => "yld",
            Self::Stop => "stop",
            Self::Err => "err",
            Self::Res => "res",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        Ok(match s {
            "ready" => Self::Ready,
            "exec" => Self::Exec,
            "eval" => Self::Eval,
            "call" => Self::Call,
            "retn" => Self::Retn,
            "step" => Self::Step,
            "yld" => Self::Yld,
            "stop" => Self::Stop,
            "err" => Self::Err,
            "res" => Self::Res,
            "done" => Self::Done,
            other => return Err(format!("unknown command `{other}`")),
        })
    }
}

impl TryFrom<String> for Command {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Command> for &'static str {
    fn from(command: Command) -> Self {
        command.as_str()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub cm: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<Primitive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Message {
    #[must_use]
    pub const fn new(cm: Command) -> Self {
        Self {
            cm,
            dt: None,
            func: None,
            id: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, dt: impl Into<Primitive>) -> Self {
        self.dt = Some(dt.into());
        self
    }

    #[must_use]
    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }

    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// `exec` with a statement block.
    #[must_use]
    pub fn exec(code: impl Into<String>) -> Self {
        Self::new(Command::Exec).with_data(Primitive::Str(code.into()))
    }

    /// `eval` with an expression.
    #[must_use]
    pub fn eval(expr: impl Into<String>) -> Self {
        Self::new(Command::Eval).with_data(Primitive::Str(expr.into()))
    }

    /// Payload as text, if it is a string.
    #[must_use]
    pub fn data_str(&self) -> Option<&str> {
        self.dt.as_ref().and_then(Primitive::as_str)
    }

    /// Payload, or `None` when absent.
    #[must_use]
    pub fn data(&self) -> &Primitive {
        const NONE: &Primitive = &Primitive::None;
        self.dt.as_ref().unwrap_or(NONE)
    }
}
