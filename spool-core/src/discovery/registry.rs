//! Memoized resolutions keyed by identity
//!
//! Each identity owns a once-initialised slot. Callers clone the slot out of the
//! map and release the shard lock before initialising it, so a factory may
//! resolve other identities (in any shard) while its own slot is being filled.

use crate::{stream::StreamPair, streamid::AnyStreamId};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub(crate) type Slot = Arc<OnceCell<StreamPair>>;

#[derive(Default)]
pub(crate) struct StreamRegistry {
    entries: DashMap<AnyStreamId, Slot>,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The memoized pair, if `id` has been resolved or provided
    pub(crate) fn get(&self, id: &AnyStreamId) -> Option<StreamPair> {
        self.entries.get(id).and_then(|slot| slot.get().cloned())
    }

    /// The slot for `id`, created empty on first use
    pub(crate) fn slot(&self, id: &AnyStreamId) -> Slot {
        Arc::clone(self.entries.entry(id.clone()).or_default().value())
    }

    /// Drop the slot for `id` after a failed resolution.
    ///
    /// The slot stays when it was filled meanwhile, was replaced, or another caller
    /// still holds it to retry the resolution.
    pub(crate) fn discard_vacant(&self, id: &AnyStreamId, slot: &Slot) {
        self.entries.remove_if(id, |_, current| {
            Arc::ptr_eq(current, slot) && current.get().is_none() && Arc::strong_count(current) <= 2
        });
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of identities backed by a stream
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    /// Forget every entry; returns how many were backed by a stream
    pub(crate) fn clear(&self) -> usize {
        let registered = self.len();
        self.entries.clear();
        registered
    }
}
