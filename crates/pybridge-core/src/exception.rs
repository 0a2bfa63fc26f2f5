//! Exception records exchanged with the interpreter.
//!
//! An `err` payload is `[bucket, exact_type, message, traceback]`, where
//! `traceback` is a list of `[file, line, function, text, params]` frames in
//! oldest-first order. The bucket is an approximate classification used to
//! pick an `ExceptionKind`; the exact type name is kept verbatim.

use std::backtrace::Backtrace;
use std::fmt;

use crate::{ConversionError, Primitive};

/// Bucket used for errors that originated on the host side.
pub const HOST_EXCEPTION_BUCKET: &str = "NETException";

/// Separator between the host type name and its registry id in the exact
/// type field of a host-originated error.
const HOST_MARKER: char = '#';

/// Approximate classification of a remote exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Generic,
    Arithmetic,
    Assertion,
    Attribute,
    Eof,
    FileNotFound,
    Import,
    Index,
    Key,
    KeyboardInterrupt,
    Lookup,
    Memory,
    Name,
    NotImplemented,
    Os,
    Overflow,
    Permission,
    Recursion,
    Runtime,
    StopIteration,
    Syntax,
    Timeout,
    Type,
    Unicode,
    Value,
    ZeroDivision,
    /// An error raised by a bound host callable or generator.
    Host,
}

impl ExceptionKind {
    const TABLE: &'static [(&'static str, Self)] = &[
        ("ArithmeticError", Self::Arithmetic),
        ("AssertionError", Self::Assertion),
        ("AttributeError", Self::Attribute),
        ("EOFError", Self::Eof),
        ("FileNotFoundError", Self::FileNotFound),
        ("ImportError", Self::Import),
        ("IndexError", Self::Index),
        ("KeyError", Self::Key),
        ("KeyboardInterrupt", Self::KeyboardInterrupt),
        ("LookupError", Self::Lookup),
        ("MemoryError", Self::Memory),
        ("NameError", Self::Name),
        ("NotImplementedError", Self::NotImplemented),
        ("OSError", Self::Os),
        ("OverflowError", Self::Overflow),
        ("PermissionError", Self::Permission),
        ("RecursionError", Self::Recursion),
        ("RuntimeError", Self::Runtime),
        ("StopIteration", Self::StopIteration),
        ("SyntaxError", Self::Syntax),
        ("TimeoutError", Self::Timeout),
        ("TypeError", Self::Type),
        ("UnicodeError", Self::Unicode),
        ("ValueError", Self::Value),
        ("ZeroDivisionError", Self::ZeroDivision),
        (HOST_EXCEPTION_BUCKET, Self::Host),
    ];

    /// Map a bucket name to a kind; unknown buckets are `Generic`.
    #[must_use]
    pub fn from_bucket(bucket: &str) -> Self {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == bucket)
            .map_or(Self::Generic, |(_, kind)| *kind)
    }

    /// Bucket name sent on the wire for this kind.
    #[must_use]
    pub fn bucket(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map_or("Exception", |(name, _)| name)
    }
}

/// One frame of a traceback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TracebackFrame {
    pub file: String,
    pub line: i64,
    pub function: String,
    pub text: String,
    pub params: String,
}

impl TracebackFrame {
    #[must_use]
    pub fn new(file: impl Into<String>, line: i64, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            text: String::new(),
            params: String::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    pub fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        let malformed = || ConversionError::Malformed(format!("traceback frame {value}"));
        let [file, line, function, text, params] = value.as_list().ok_or_else(malformed)? else {
            return Err(malformed());
        };
        let text_of = |p: &Primitive| match p {
            Primitive::Str(s) => s.clone(),
            Primitive::None => String::new(),
            other => other.to_string(),
        };
        Ok(Self {
            file: text_of(file),
            line: line.as_i64().unwrap_or_default(),
            function: text_of(function),
            text: text_of(text),
            params: text_of(params),
        })
    }

    #[must_use]
    pub fn to_primitive(&self) -> Primitive {
        Primitive::List(vec![
            Primitive::Str(self.file.clone()),
            Primitive::Int(self.line),
            Primitive::Str(self.function.clone()),
            Primitive::Str(self.text.clone()),
            Primitive::Str(self.params.clone()),
        ])
    }
}

impl fmt::Display for TracebackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  File \"{}\", line {}, in {}",
            self.file, self.line, self.function
        )?;
        if !self.params.is_empty() {
            write!(f, " ({})", self.params)?;
        }
        if !self.text.is_empty() {
            write!(f, "\n    {}", self.text.trim())?;
        }
        Ok(())
    }
}

fn format_traceback(
    f: &mut fmt::Formatter<'_>,
    frames: &[TracebackFrame],
    type_name: &str,
    message: &str,
) -> fmt::Result {
    writeln!(f, "Traceback (most recent call last):")?;
    for frame in frames {
        writeln!(f, "{frame}")?;
    }
    write!(f, "{type_name}: {message}")
}

/// Decoded `err` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub bucket: String,
    pub type_name: String,
    pub message: String,
    pub traceback: Vec<TracebackFrame>,
}

impl ErrorPayload {
    /// Decode `[bucket, exact_type, message, traceback]`.
    ///
    /// The two-field `[type, message]` shape of older drivers is rejected.
    pub fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        let items = value
            .as_list()
            .ok_or_else(|| ConversionError::Malformed(format!("error payload {value}")))?;
        let [bucket, type_name, message, traceback] = items else {
            return Err(ConversionError::Malformed(format!(
                "error payload must have 4 fields, got {}",
                items.len()
            )));
        };
        let string = |p: &Primitive| {
            p.as_str()
                .map(ToString::to_string)
                .ok_or_else(|| ConversionError::Malformed(format!("expected string, got {p}")))
        };
        let traceback = match traceback {
            Primitive::List(frames) => frames
                .iter()
                .map(TracebackFrame::from_primitive)
                .collect::<Result<_, _>>()?,
            Primitive::None => Vec::new(),
            other => {
                return Err(ConversionError::Malformed(format!(
                    "traceback must be a list, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(Self {
            bucket: string(bucket)?,
            type_name: string(type_name)?,
            message: string(message)?,
            traceback,
        })
    }

    #[must_use]
    pub fn to_primitive(&self) -> Primitive {
        Primitive::List(vec![
            Primitive::Str(self.bucket.clone()),
            Primitive::Str(self.type_name.clone()),
            Primitive::Str(self.message.clone()),
            Primitive::List(
                self.traceback
                    .iter()
                    .map(TracebackFrame::to_primitive)
                    .collect(),
            ),
        ])
    }

    /// Registry id of a host-originated error, if this payload carries one.
    #[must_use]
    pub fn host_error_id(&self) -> Option<u64> {
        if self.bucket != HOST_EXCEPTION_BUCKET {
            return None;
        }
        let (_, id) = self.type_name.rsplit_once(HOST_MARKER)?;
        id.parse().ok()
    }
}

/// An exception raised while the interpreter executed host-submitted code.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteException {
    pub kind: ExceptionKind,
    /// Exact interpreter type name, e.g. `json.decoder.JSONDecodeError`.
    pub type_name: String,
    pub message: String,
    /// Frames in oldest-first order.
    pub traceback: Vec<TracebackFrame>,
}

impl RemoteException {
    #[must_use]
    pub fn from_payload(payload: ErrorPayload) -> Self {
        Self {
            kind: ExceptionKind::from_bucket(&payload.bucket),
            type_name: payload.type_name,
            message: payload.message,
            traceback: payload.traceback,
        }
    }

    /// Human-readable traceback in the interpreter's usual layout.
    #[must_use]
    pub fn format_traceback(&self) -> String {
        struct Tb<'a>(&'a RemoteException);
        impl fmt::Display for Tb<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_traceback(f, &self.0.traceback, &self.0.type_name, &self.0.message)
            }
        }
        Tb(self).to_string()
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.type_name, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// An error raised by host code invoked from the interpreter.
///
/// The host call stack is captured when the error is built. Frames pushed
/// with `with_frame` go innermost first as the error propagates outward, the
/// same order a stack unwinds in. `traceback()` reverses them so the newest
/// frame prints last.
#[derive(Debug)]
pub struct HostError {
    type_name: String,
    message: String,
    stack: Backtrace,
    /// Bound function the interpreter called into.
    entry: Option<TracebackFrame>,
    frames: Vec<TracebackFrame>,
    /// Traceback of a remote exception this error wraps.
    cause_traceback: Vec<TracebackFrame>,
    /// Remote frames appended after the error crossed back from the interpreter.
    returned_traceback: Vec<TracebackFrame>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HostError {
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack: Backtrace::force_capture(),
            entry: None,
            frames: Vec::new(),
            cause_traceback: Vec::new(),
            returned_traceback: Vec::new(),
            source: None,
        }
    }

    /// Wrap any error, using its Rust type name as the exception type.
    #[must_use]
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut host = Self::new(std::any::type_name::<E>(), error.to_string());
        host.source = Some(Box::new(error));
        host
    }

    /// Wrap a remote exception, keeping its traceback ahead of the host frames.
    #[must_use]
    pub fn from_remote(error: RemoteException) -> Self {
        let mut host = Self::new(error.type_name.clone(), error.message.clone());
        host.cause_traceback.clone_from(&error.traceback);
        host.source = Some(Box::new(error));
        host
    }

    /// Push a frame; call from the innermost frame outward.
    #[must_use]
    pub fn with_frame(mut self, frame: TracebackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Name the frame of the host function the interpreter called into.
    pub fn set_entry(&mut self, frame: TracebackFrame) {
        self.entry = Some(frame);
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Merged traceback, oldest first: wrapped remote frames, the entry
    /// frame, pushed frames, the captured host stack, then any frames
    /// appended on the way back from the interpreter.
    #[must_use]
    pub fn traceback(&self) -> Vec<TracebackFrame> {
        self.cause_traceback
            .iter()
            .chain(self.entry.iter())
            .chain(self.frames.iter().rev())
            .cloned()
            .chain(crate::stack::frames(&self.stack))
            .chain(self.returned_traceback.iter().cloned())
            .collect()
    }

    /// Record the remote segment of the traceback after a round trip.
    ///
    /// A leading run equal to the traceback already held is the interpreter
    /// echoing what it was sent, and is skipped.
    pub fn append_remote_traceback(&mut self, frames: impl IntoIterator<Item = TracebackFrame>) {
        let frames: Vec<_> = frames.into_iter().collect();
        let held = self.traceback();
        let segment = frames.strip_prefix(held.as_slice()).unwrap_or(&frames);
        self.returned_traceback.extend_from_slice(segment);
    }

    /// Encode for the interpreter, tagging the exact type with `registry_id`
    /// so the error can be reunited with this value if it comes back.
    #[must_use]
    pub fn to_payload(&self, registry_id: u64) -> ErrorPayload {
        ErrorPayload {
            bucket: HOST_EXCEPTION_BUCKET.to_string(),
            type_name: format!("{}{HOST_MARKER}{registry_id}", self.type_name),
            message: self.message.clone(),
            traceback: self.traceback(),
        }
    }

    /// Human-readable merged traceback.
    #[must_use]
    pub fn format_traceback(&self) -> String {
        struct Tb<'a>(&'a HostError);
        impl fmt::Display for Tb<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_traceback(f, &self.0.traceback(), &self.0.type_name, &self.0.message)
            }
        }
        Tb(self).to_string()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.type_name, self.message)
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<RemoteException> for HostError {
    fn from(error: RemoteException) -> Self {
        Self::from_remote(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str) -> TracebackFrame {
        TracebackFrame::new("<stdin>", 1, function)
    }

    #[test]
    fn test_bucket_mapping() {
        assert_eq!(ExceptionKind::from_bucket("KeyError"), ExceptionKind::Key);
        assert_eq!(
            ExceptionKind::from_bucket("TimeoutError"),
            ExceptionKind::Timeout
        );
        assert_eq!(
            ExceptionKind::from_bucket("SomethingCustom"),
            ExceptionKind::Generic
        );
        assert_eq!(ExceptionKind::Value.bucket(), "ValueError");
        assert_eq!(ExceptionKind::Generic.bucket(), "Exception");
    }

    #[test]
    fn test_payload_decodes_full_shape() {
        let payload = ErrorPayload {
            bucket: "KeyError".into(),
            type_name: "KeyError".into(),
            message: "'missing'".into(),
            traceback: vec![frame("<module>").with_text("d['missing']")],
        };
        let decoded = ErrorPayload::from_primitive(&payload.to_primitive()).unwrap();
        assert_eq!(decoded, payload);

        let exception = RemoteException::from_payload(decoded);
        assert_eq!(exception.kind, ExceptionKind::Key);
        assert_eq!(exception.to_string(), "KeyError - 'missing'");
        assert!(exception
            .format_traceback()
            .ends_with("d['missing']\nKeyError: 'missing'"));
    }

    #[test]
    fn test_legacy_two_field_payload_is_rejected() {
        let legacy = Primitive::List(vec![
            Primitive::Str("ValueError".into()),
            Primitive::Str("bad".into()),
        ]);
        assert!(matches!(
            ErrorPayload::from_primitive(&legacy),
            Err(ConversionError::Malformed(_))
        ));
    }

    #[test]
    fn test_host_error_traceback_merges_in_order() {
        let remote = RemoteException {
            kind: ExceptionKind::Value,
            type_name: "ValueError".into(),
            message: "bad".into(),
            traceback: vec![frame("remote_outer"), frame("remote_inner")],
        };
        let mut error = HostError::from_remote(remote)
            .with_frame(frame("host_inner"))
            .with_frame(frame("host_outer"));
        error.append_remote_traceback([frame("returned")]);

        let names: Vec<_> = error
            .traceback()
            .into_iter()
            .filter(|f| f.file == "<stdin>")
            .map(|f| f.function)
            .collect();
        assert_eq!(
            names,
            vec!["remote_outer", "remote_inner", "host_outer", "host_inner", "returned"]
        );
        assert_eq!(error.traceback().last().unwrap().function, "returned");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_host_payload_carries_registry_id() {
        let mut error = HostError::new("ParseError", "bad digit");
        error.set_entry(frame("sum3"));
        let payload = error.to_payload(17);
        assert_eq!(payload.bucket, "NETException");
        assert_eq!(payload.host_error_id(), Some(17));
        assert_eq!(payload.traceback, error.traceback());
        assert!(payload.traceback.iter().any(|f| f.function == "sum3"));

        let foreign = ErrorPayload {
            bucket: "ValueError".into(),
            type_name: "ValueError#3".into(),
            message: String::new(),
            traceback: Vec::new(),
        };
        assert_eq!(foreign.host_error_id(), None);
    }

    #[test]
    fn test_echoed_bucket_is_reunited() {
        let echoed = ErrorPayload {
            bucket: "NETException".into(),
            type_name: "ParseError#3".into(),
            message: "bad digit".into(),
            traceback: Vec::new(),
        };
        assert_eq!(echoed.host_error_id(), Some(3));
        let exception = RemoteException::from_payload(echoed);
        assert_eq!(exception.kind, ExceptionKind::Host);
        assert_eq!(ExceptionKind::Host.bucket(), "NETException");
    }

    #[test]
    fn test_host_stack_is_captured_newest_last() {
        let error = HostError::new("ParseError", "bad digit").with_frame(frame("pushed"));
        let traceback = error.traceback();
        assert!(traceback.len() > 1);
        assert_eq!(traceback[0].function, "pushed");
        assert!(traceback
            .iter()
            .all(|f| !f.function.contains("force_capture")));
        let this_test = traceback
            .iter()
            .position(|f| f.function.contains("test_host_stack_is_captured_newest_last"));
        let runner = traceback
            .iter()
            .position(|f| f.function.contains("run_test"));
        if let (Some(this_test), Some(runner)) = (this_test, runner) {
            assert!(runner < this_test);
        }
    }

    #[test]
    fn test_echoed_host_frames_are_not_duplicated() {
        let mut error = HostError::new("ParseError", "bad digit");
        error.set_entry(frame("sum3"));
        let sent = error.to_payload(1).traceback;
        let remote = frame("<module>").with_text("sum3(1, 'x')");

        let mut echoed = sent.clone();
        echoed.push(remote.clone());
        error.append_remote_traceback(echoed);

        let traceback = error.traceback();
        assert_eq!(traceback.len(), sent.len() + 1);
        assert_eq!(traceback.last(), Some(&remote));
        assert_eq!(traceback.iter().filter(|f| f.function == "sum3").count(), 1);

        let mut partial = HostError::new("ParseError", "bad digit");
        partial.append_remote_traceback([frame("unrelated"), remote.clone()]);
        let tail: Vec<_> = partial.traceback().into_iter().rev().take(2).collect();
        assert_eq!(tail, vec![remote, frame("unrelated")]);
    }
}
