//! Single-pass iteration over remote iterables.

use futures::Stream;
use pybridge_core::ExceptionKind;
use tracing::debug;

use super::Value;
use crate::error::SessionError;
use crate::session::Session;

/// Cursor over `iter(value)` held by the interpreter.
///
/// Every `next` is one round trip. The cursor is fused: once the
/// interpreter raises `StopIteration`, the remote iterator is released and
/// later calls return `None` without I/O.
#[derive(Debug)]
pub struct RemoteIter {
    session: Session,
    iterator: Option<Value>,
}

impl RemoteIter {
    pub(crate) async fn new(iterable: &Value) -> Result<Self, SessionError> {
        let session = iterable.session_or_default()?;
        let expression = format!("iter({})", iterable.expression()?);
        let iterator = session.eval(&expression, false).await?;
        Ok(Self {
            session,
            iterator: Some(iterator),
        })
    }

    /// Advance the remote iterator.
    ///
    /// # Errors
    /// Returns any remote exception other than `StopIteration`, and
    /// transport errors.
    pub async fn next(&mut self) -> Result<Option<Value>, SessionError> {
        let Some(iterator) = &self.iterator else {
            return Ok(None);
        };
        let expression = format!("next({})", iterator.expression()?);
        match self.session.eval(&expression, true).await {
            Ok(value) => Ok(Some(value)),
            Err(SessionError::Remote(e)) if e.kind == ExceptionKind::StopIteration => {
                debug!(iterator = %iterator, "Remote iterator exhausted");
                if let Some(iterator) = self.iterator.take() {
                    iterator.dispose().await;
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the remote side has signalled exhaustion.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.iterator.is_none()
    }

    /// Drain the remaining items into a vector.
    ///
    /// # Errors
    /// See `next`.
    pub async fn collect(mut self) -> Result<Vec<Value>, SessionError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// The remaining items as a stream. The stream ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value, SessionError>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            match iter.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(iter))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
