//! Bounded session-side tables.

use std::collections::VecDeque;

use pybridge_core::HostError;
use tracing::warn;

/// Host errors kept for reuniting with their round trip.
const MAX_HOST_ERRORS: usize = 256;

/// Proxy names awaiting remote deletion.
const MAX_ORPHANS: usize = 4096;

/// Host errors sent to the interpreter, keyed by the id embedded in their
/// exact type name. Oldest entries are evicted first.
#[derive(Debug, Default)]
pub(crate) struct ErrorRegistry {
    entries: VecDeque<(u64, HostError)>,
    next_id: u64,
}

impl ErrorRegistry {
    /// Id the next inserted error will get.
    pub(crate) const fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn insert(&mut self, error: HostError) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.entries.len() == MAX_HOST_ERRORS {
            self.entries.pop_front();
        }
        self.entries.push_back((id, error));
        id
    }

    pub(crate) fn take(&mut self, id: u64) -> Option<HostError> {
        let position = self.entries.iter().position(|(entry, _)| *entry == id)?;
        self.entries.remove(position).map(|(_, error)| error)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Names of proxies dropped without an explicit dispose.
#[derive(Debug, Default)]
pub(crate) struct OrphanTable {
    names: VecDeque<String>,
}

impl OrphanTable {
    pub(crate) fn push(&mut self, name: String) {
        if self.names.len() == MAX_ORPHANS {
            if let Some(leaked) = self.names.pop_front() {
                warn!(name = %leaked, "Orphan table full, remote variable leaked");
            }
        }
        self.names.push_back(name);
    }

    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.names.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
