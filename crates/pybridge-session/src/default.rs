//! Process-wide default session.
//!
//! Every session entry point makes its session the default, so the last
//! session used wins. Values not tied to a session evaluate in the default
//! one. Programs driving several sessions at once should keep their values
//! tied to a session rather than rely on this.

use std::sync::Weak;

use parking_lot::RwLock;

use crate::session::{Inner, Session};

static DEFAULT: RwLock<Option<Weak<Inner>>> = parking_lot::const_rwlock(None);

pub(crate) fn set(session: &Session) {
    let mut slot = DEFAULT.write();
    let current = slot.as_ref().and_then(Weak::upgrade);
    if !current.is_some_and(|inner| session.is_inner(&inner)) {
        *slot = Some(session.downgrade());
    }
}

/// The default session, if one is set and still alive.
#[must_use]
pub fn current() -> Option<Session> {
    DEFAULT
        .read()
        .as_ref()
        .and_then(Weak::upgrade)
        .map(Session::from_inner)
}

/// Clear the default if it is `session`.
pub(crate) fn clear_if(session: &Session) {
    let mut slot = DEFAULT.write();
    let is_current = slot
        .as_ref()
        .and_then(Weak::upgrade)
        .is_some_and(|inner| session.is_inner(&inner));
    if is_current {
        *slot = None;
    }
}

/// Clear the default session.
pub fn clear() {
    *DEFAULT.write() = None;
}
