//! Index of named events: at most one live event per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::deferred::EventCell;

/// Key → completion cell of the live event registered under it.
///
/// The index shares the cell with the queued or scheduled entry, so removal
/// from either side is detected by pointer identity rather than by keeping
/// two collections in sync.
#[derive(Default)]
pub(crate) struct NamedEvents {
    entries: Mutex<HashMap<String, Arc<EventCell>>>,
}

impl NamedEvents {
    /// Register `cell` under `key`, cancelling the event it replaces.
    ///
    /// Returns whether an earlier event was registered under `key`.
    pub(crate) fn replace(&self, key: &str, cell: Arc<EventCell>) -> bool {
        let previous = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), cell);
        match previous {
            Some(previous) => {
                previous.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove `key` and cancel its event; `false` when nothing was registered.
    pub(crate) fn cancel(&self, key: &str) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(cell) => {
                cell.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove `key` only if it still refers to `cell`.
    pub(crate) fn forget(&self, key: &str, cell: &Arc<EventCell>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            entries.remove(key);
        }
    }

    /// Cancel and remove every entry, returning the keys that were live.
    pub(crate) fn cancel_all(&self) -> Vec<String> {
        let drained: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        drained
            .into_iter()
            .map(|(key, cell)| {
                cell.cancel();
                key
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
