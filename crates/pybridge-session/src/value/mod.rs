//! Remote values.
//!
//! A `Value` is one of three things:
//! - a proxy naming a variable held by the interpreter
//! - a resolved value already transferred to the host
//! - an operation over other values that has not been evaluated yet
//!
//! Building operations never talks to the interpreter. Evaluating them does,
//! through the session the operands belong to.

mod convert;
mod iter;
mod operation;

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pybridge_core::{ConversionError, FromPrimitive, Primitive, is_identifier};
use tracing::trace;

pub use iter::RemoteIter;
pub use operation::{BinaryOp, Operation, UnaryOp};

use crate::default;
use crate::error::SessionError;
use crate::registry::OrphanTable;
use crate::session::Session;

/// A remote value: proxy, resolved value or pending operation.
///
/// Clones share state: disposing one clone of a proxy disposes them all.
#[derive(Clone)]
pub struct Value {
    session: Option<Session>,
    repr: Arc<Repr>,
}

enum Repr {
    Proxy(ProxyHandle),
    Resolved(Mutex<Primitive>),
    Operation(Operation),
}

struct ProxyHandle {
    name: Mutex<Option<String>>,
    /// Pinned proxies name interpreter globals the host does not own.
    pinned: bool,
    orphans: Weak<Mutex<OrphanTable>>,
}

impl ProxyHandle {
    fn name(&self) -> Result<String, SessionError> {
        self.name.lock().clone().ok_or(SessionError::UseAfterDispose)
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        let Some(name) = self.name.get_mut().take() else {
            return;
        };
        if self.pinned {
            return;
        }
        if let Some(orphans) = self.orphans.upgrade() {
            trace!(%name, "Proxy dropped without dispose");
            orphans.lock().push(name);
        }
    }
}

macro_rules! binary_builders {
    ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {$(
        $(#[$doc])*
        ///
        /// # Errors
        /// Returns `CrossSession` if the operands belong to different sessions.
        pub fn $name(&self, other: &Self) -> Result<Self, SessionError> {
            self.binary(BinaryOp::$op, other)
        }
    )*};
}

impl Value {
    pub(crate) fn proxy(session: &Session, name: String, pinned: bool) -> Self {
        Self {
            session: Some(session.clone()),
            repr: Arc::new(Repr::Proxy(ProxyHandle {
                name: Mutex::new(Some(name)),
                pinned,
                orphans: session.orphan_table(),
            })),
        }
    }

    pub(crate) fn resolved(session: Option<Session>, value: Primitive) -> Self {
        Self {
            session,
            repr: Arc::new(Repr::Resolved(Mutex::new(value))),
        }
    }

    fn from_operation(operation: Operation) -> Result<Self, SessionError> {
        let session = common_session(operation.operands())?;
        Ok(Self {
            session,
            repr: Arc::new(Repr::Operation(operation)),
        })
    }

    /// A resolved value not tied to any session.
    ///
    /// It joins the session of whatever value it is combined with, or the
    /// default session if it is evaluated on its own.
    #[must_use]
    pub fn literal(value: impl Into<Primitive>) -> Self {
        Self::resolved(None, value.into())
    }

    /// The session this value belongs to, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(*self.repr, Repr::Proxy(_))
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.repr, Repr::Resolved(_))
    }

    #[must_use]
    pub fn as_operation(&self) -> Option<&Operation> {
        match &*self.repr {
            Repr::Operation(op) => Some(op),
            _ => None,
        }
    }

    /// Whether this is a proxy whose remote variable has been released.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        match &*self.repr {
            Repr::Proxy(handle) => handle.name.lock().is_none(),
            _ => false,
        }
    }

    /// Snapshot of a resolved value.
    #[must_use]
    pub fn primitive(&self) -> Option<Primitive> {
        match &*self.repr {
            Repr::Resolved(value) => Some(value.lock().clone()),
            _ => None,
        }
    }

    /// Expression text naming or describing this value. No I/O.
    ///
    /// # Errors
    /// Returns `UseAfterDispose` for a disposed proxy, or a conversion error
    /// for a resolved value without a literal form.
    pub fn expression(&self) -> Result<String, SessionError> {
        match &*self.repr {
            Repr::Proxy(handle) => handle.name(),
            Repr::Resolved(value) => Ok(value.lock().to_expression()?),
            Repr::Operation(op) => op.render(),
        }
    }

    /// Expression text usable before `.attr`, `[key]` or `(args)`.
    pub(crate) fn target_expression(&self) -> Result<String, SessionError> {
        let text = self.expression()?;
        Ok(match &*self.repr {
            Repr::Resolved(_) => format!("({text})"),
            _ => text,
        })
    }

    /// The session to evaluate in: this value's own, else the default one.
    pub(crate) fn session_or_default(&self) -> Result<Session, SessionError> {
        self.session
            .clone()
            .or_else(default::current)
            .ok_or(SessionError::NoDefaultSession)
    }

    /// `self <op> other`.
    ///
    /// # Errors
    /// Returns `CrossSession` if the operands belong to different sessions.
    pub fn binary(&self, op: BinaryOp, other: &Self) -> Result<Self, SessionError> {
        Self::from_operation(Operation::Binary {
            op,
            left: self.clone(),
            right: other.clone(),
        })
    }

    binary_builders!(
        plus => Add,
        minus => Sub,
        times => Mul,
        /// True division.
        divide => Div,
        floor_divide => FloorDiv,
        modulo => Mod,
        power => Pow,
        bit_and => BitAnd,
        bit_or => BitOr,
        bit_xor => BitXor,
        shift_left => Shl,
        shift_right => Shr,
        /// Remote `==`; see `equals` for a host-side comparison.
        eq_op => Eq,
        ne_op => Ne,
        lt_op => Lt,
        le_op => Le,
        gt_op => Gt,
        ge_op => Ge,
        and => And,
        or => Or,
        /// `self in other`.
        is_in => In,
        not_in => NotIn,
        /// Remote identity test.
        is => Is,
        is_not => IsNot,
    );

    /// `<op> self`.
    #[must_use]
    pub fn unary(&self, op: UnaryOp) -> Self {
        Self {
            session: self.session.clone(),
            repr: Arc::new(Repr::Operation(Operation::Unary {
                op,
                operand: self.clone(),
            })),
        }
    }

    /// `self.name`.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` if `name` is not an identifier.
    pub fn get_attr(&self, name: &str) -> Result<Self, SessionError> {
        if !is_identifier(name) {
            return Err(SessionError::InvalidIdentifier(name.to_string()));
        }
        Self::from_operation(Operation::Attr {
            target: self.clone(),
            name: name.to_string(),
        })
    }

    /// `self[key]`.
    ///
    /// # Errors
    /// Returns `CrossSession` if the operands belong to different sessions.
    pub fn item(&self, key: &Self) -> Result<Self, SessionError> {
        Self::from_operation(Operation::Index {
            target: self.clone(),
            key: key.clone(),
        })
    }

    /// `self(args...)`.
    ///
    /// # Errors
    /// Returns `CrossSession` if the operands belong to different sessions.
    pub fn call(&self, args: &[Self]) -> Result<Self, SessionError> {
        Self::from_operation(Operation::Call {
            target: self.clone(),
            args: args.to_vec(),
        })
    }

    /// Evaluate this value.
    ///
    /// Eager evaluation returns a resolved value. Lazy evaluation of an
    /// operation assigns it to a fresh interpreter variable and returns a
    /// proxy to it. Resolved values and lazily evaluated proxies are
    /// returned as they are.
    ///
    /// # Errors
    /// Returns remote, transport and lifecycle errors of the evaluation.
    pub async fn evaluate(&self, eager: bool) -> Result<Self, SessionError> {
        if let Some(local) = self.local()? {
            return Ok(Self::resolved(self.session.clone(), local));
        }
        if let Repr::Proxy(handle) = &*self.repr {
            let name = handle.name()?;
            if !eager {
                return Ok(self.clone());
            }
            let session = self.session_or_default()?;
            let value = session.eval_primitive(&name).await?;
            return Ok(Self::resolved(Some(session), value));
        }
        let expression = self.expression()?;
        self.session_or_default()?.eval(&expression, eager).await
    }

    /// Evaluate eagerly and return the transferred value.
    ///
    /// # Errors
    /// Returns remote, transport and lifecycle errors of the evaluation.
    pub async fn resolve(&self) -> Result<Primitive, SessionError> {
        if let Some(local) = self.local()? {
            return Ok(local);
        }
        let expression = self.expression()?;
        self.session_or_default()?.eval_primitive(&expression).await
    }

    /// Evaluate eagerly and convert to a host type.
    ///
    /// # Errors
    /// Returns evaluation errors, or `Conversion` if the value does not fit `T`.
    pub async fn get<T: FromPrimitive>(&self) -> Result<T, SessionError> {
        Ok(T::from_primitive(&self.resolve().await?)?)
    }

    /// Host-side value when it can be computed without the interpreter:
    /// resolved values, and attribute or item lookups on resolved values.
    fn local(&self) -> Result<Option<Primitive>, SessionError> {
        match &*self.repr {
            Repr::Resolved(value) => Ok(Some(value.lock().clone())),
            Repr::Proxy(_) => Ok(None),
            Repr::Operation(Operation::Index { target, key }) => {
                let (Some(target), Some(key)) = (target.local()?, key.local()?) else {
                    return Ok(None);
                };
                Ok(Some(target.item(&key)?.clone()))
            }
            Repr::Operation(Operation::Attr { target, name }) => match target.local()? {
                Some(Primitive::Record(record)) => Ok(Some(record.get(name)?.clone())),
                _ => Ok(None),
            },
            Repr::Operation(_) => Ok(None),
        }
    }

    /// Assign `self.name = value`.
    ///
    /// Runs immediately. The target must be a proxy or a resolved record;
    /// a resolved record is updated on the host only.
    ///
    /// # Errors
    /// Returns `RequiresEvaluationFirst` for an operation target,
    /// `InvalidIdentifier` for a bad name, or the errors of the assignment.
    pub async fn set_attr(&self, name: &str, value: &Self) -> Result<(), SessionError> {
        if !is_identifier(name) {
            return Err(SessionError::InvalidIdentifier(name.to_string()));
        }
        match &*self.repr {
            Repr::Operation(_) => Err(SessionError::RequiresEvaluationFirst),
            Repr::Proxy(handle) => {
                let target = handle.name()?;
                let session = common_session([self, value])?.ok_or(SessionError::NoDefaultSession)?;
                let code = format!("{target}.{name} = {}\n", value.expression()?);
                session.exec(&code).await
            }
            Repr::Resolved(slot) => {
                let value = value.resolve().await?;
                let mut slot = slot.lock();
                match &mut *slot {
                    Primitive::Record(record) => Ok(record.set(name, value)?),
                    other => Err(ConversionError::InvalidCast {
                        from: other.type_name(),
                        to: "dataclass",
                    }
                    .into()),
                }
            }
        }
    }

    /// Assign `self[key] = value`.
    ///
    /// Runs immediately. The target must be a proxy or a resolved list or
    /// dict; a resolved target is updated on the host only.
    ///
    /// # Errors
    /// Returns `RequiresEvaluationFirst` for an operation target, or the
    /// errors of the assignment.
    pub async fn set_item(&self, key: &Self, value: &Self) -> Result<(), SessionError> {
        match &*self.repr {
            Repr::Operation(_) => Err(SessionError::RequiresEvaluationFirst),
            Repr::Proxy(handle) => {
                let target = handle.name()?;
                let session =
                    common_session([self, key, value])?.ok_or(SessionError::NoDefaultSession)?;
                let code = format!("{target}[{}] = {}\n", key.expression()?, value.expression()?);
                session.exec(&code).await
            }
            Repr::Resolved(slot) => {
                let key = key.resolve().await?;
                let value = value.resolve().await?;
                Ok(slot.lock().set_item(key, value)?)
            }
        }
    }

    /// Host-side structural equality. Evaluates both sides.
    ///
    /// # Errors
    /// Returns `CrossSession` or the errors of either evaluation.
    pub async fn equals(&self, other: &Self) -> Result<bool, SessionError> {
        common_session([self, other])?;
        Ok(self.resolve().await? == other.resolve().await?)
    }

    /// Negation of `equals`.
    ///
    /// # Errors
    /// See `equals`.
    pub async fn not_equals(&self, other: &Self) -> Result<bool, SessionError> {
        Ok(!self.equals(other).await?)
    }

    /// Host-side ordering. Evaluates both sides.
    ///
    /// # Errors
    /// Returns `NotComparable` if the resolved values have no ordering,
    /// `CrossSession`, or the errors of either evaluation.
    pub async fn compare(&self, other: &Self) -> Result<Ordering, SessionError> {
        common_session([self, other])?;
        let left = self.resolve().await?;
        let right = other.resolve().await?;
        left.partial_cmp(&right)
            .ok_or_else(|| SessionError::NotComparable {
                left: left.type_name(),
                right: right.type_name(),
            })
    }

    /// # Errors
    /// See `compare`.
    pub async fn less_than(&self, other: &Self) -> Result<bool, SessionError> {
        Ok(self.compare(other).await?.is_lt())
    }

    /// # Errors
    /// See `compare`.
    pub async fn less_equal(&self, other: &Self) -> Result<bool, SessionError> {
        Ok(self.compare(other).await?.is_le())
    }

    /// # Errors
    /// See `compare`.
    pub async fn greater_than(&self, other: &Self) -> Result<bool, SessionError> {
        Ok(self.compare(other).await?.is_gt())
    }

    /// # Errors
    /// See `compare`.
    pub async fn greater_equal(&self, other: &Self) -> Result<bool, SessionError> {
        Ok(self.compare(other).await?.is_ge())
    }

    /// Whether the value is `None`; remote values are tested with `is`.
    ///
    /// # Errors
    /// Returns the errors of the evaluation.
    pub async fn is_none(&self) -> Result<bool, SessionError> {
        if let Some(local) = self.local()? {
            return Ok(local.is_none());
        }
        let session = self.session_or_default()?;
        self.is(&session.none())?.get().await
    }

    /// `len(self)`, computed on the host for resolved containers.
    ///
    /// # Errors
    /// Returns the errors of the evaluation, or `Conversion` if the value
    /// has no length.
    pub async fn len(&self) -> Result<usize, SessionError> {
        if let Some(local) = self.local()? {
            return Ok(local_len(&local)?);
        }
        let len = self.session_or_default()?.builtin_len()?;
        len.call(std::slice::from_ref(self))?.get().await
    }

    /// `str(self)`, computed by the interpreter.
    ///
    /// # Errors
    /// Returns the errors of the evaluation.
    pub async fn to_text(&self) -> Result<String, SessionError> {
        let str_fn = self.session_or_default()?.builtin_str()?;
        str_fn.call(std::slice::from_ref(self))?.get().await
    }

    /// Release the remote variable of a proxy. Idempotent; a no-op for
    /// other values. Failures are logged and swallowed.
    pub async fn dispose(&self) {
        let Repr::Proxy(handle) = &*self.repr else {
            return;
        };
        let Some(name) = handle.name.lock().take() else {
            return;
        };
        if handle.pinned {
            return;
        }
        if let Some(session) = &self.session {
            session.delete_var(name).await;
        }
    }

    /// Single-pass iteration over `iter(self)`.
    ///
    /// # Errors
    /// Returns the errors of creating the remote iterator.
    pub async fn iter(&self) -> Result<RemoteIter, SessionError> {
        RemoteIter::new(self).await
    }
}

/// The one session all `values` belong to, ignoring detached values.
pub(crate) fn common_session<'a>(
    values: impl IntoIterator<Item = &'a Value>,
) -> Result<Option<Session>, SessionError> {
    let mut found: Option<&Session> = None;
    for session in values.into_iter().filter_map(|v| v.session.as_ref()) {
        match found {
            Some(first) if !first.ptr_eq(session) => return Err(SessionError::CrossSession),
            Some(_) => {}
            None => found = Some(session),
        }
    }
    Ok(found.cloned())
}

fn local_len(value: &Primitive) -> Result<usize, ConversionError> {
    match value {
        Primitive::Str(s) => Ok(s.chars().count()),
        Primitive::Bytes(b) => Ok(b.len()),
        Primitive::List(items) => Ok(items.len()),
        Primitive::Set(set) => Ok(set.len()),
        Primitive::Map(map) => Ok(map.len()),
        other => Err(ConversionError::InvalidCast {
            from: other.type_name(),
            to: "sized",
        }),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.repr {
            Repr::Proxy(_) => "Proxy",
            Repr::Resolved(_) => "Resolved",
            Repr::Operation(_) => "Operation",
        };
        f.debug_tuple(kind).field(&self.to_string()).finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.repr {
            Repr::Proxy(handle) => match handle.name.lock().as_deref() {
                Some(name) => f.write_str(name),
                None => f.write_str("<disposed>"),
            },
            Repr::Resolved(value) => write!(f, "{}", &*value.lock()),
            Repr::Operation(op) => write!(f, "{op}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pybridge_core::Record;

    use super::*;

    #[tokio::test]
    async fn test_nested_lookup_is_local() {
        let mut inner = pybridge_core::PyMap::new();
        inner.insert(
            Primitive::Float(-7.6),
            Primitive::Set(["x", "y"].into_iter().map(Primitive::from).collect()),
        );
        let list = Value::literal(vec![Primitive::Int(1), Primitive::Int(2), Primitive::Map(inner)]);
        let set = list
            .item(&Value::literal(2))
            .unwrap()
            .item(&Value::literal(-7.6))
            .unwrap();
        let expected = Primitive::Set(["y", "x"].into_iter().map(Primitive::from).collect());
        assert_eq!(set.resolve().await.unwrap(), expected);
        assert!(set.evaluate(true).await.unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_resolved_record_assignment() {
        let point = Value::literal(Record::new("Point", [("x", Primitive::Int(1))]));
        point.set_attr("x", &Value::literal(5)).await.unwrap();
        assert_eq!(point.get_attr("x").unwrap().get::<i64>().await.unwrap(), 5);
        assert!(matches!(
            point.set_attr("y", &Value::literal(0)).await,
            Err(SessionError::Conversion(ConversionError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_resolved_list_item_assignment() {
        let list = Value::literal(vec![Primitive::Int(1), Primitive::Int(2)]);
        list.set_item(&Value::literal(-1), &Value::literal("z"))
            .await
            .unwrap();
        assert_eq!(list.get::<Vec<Primitive>>().await.unwrap()[1], Primitive::from("z"));
    }

    #[tokio::test]
    async fn test_operation_target_cannot_be_assigned() {
        let sum = Value::literal(1).plus(&Value::literal(2)).unwrap();
        assert!(matches!(
            sum.set_item(&Value::literal(0), &Value::literal(1)).await,
            Err(SessionError::RequiresEvaluationFirst)
        ));
        assert!(matches!(
            sum.set_attr("x", &Value::literal(1)).await,
            Err(SessionError::RequiresEvaluationFirst)
        ));
    }

    #[tokio::test]
    async fn test_local_comparisons() {
        let one = Value::literal(1);
        assert!(one.equals(&Value::literal(1.0)).await.unwrap());
        assert!(one.less_than(&Value::literal(2)).await.unwrap());
        assert!(matches!(
            one.compare(&Value::literal("a")).await,
            Err(SessionError::NotComparable { left: "int", right: "str" })
        ));
        assert_eq!(Value::literal("héllo").len().await.unwrap(), 5);
        assert!(Value::literal(()).is_none().await.unwrap());
    }

    #[test]
    fn test_attr_names_are_validated() {
        assert!(matches!(
            Value::literal(1).get_attr("not valid"),
            Err(SessionError::InvalidIdentifier(_))
        ));
    }
}
