//! Type-erased map from message kind to exactly one handler.
//!
//! Values are stored as `Box<dyn Any>` and recovered by downcasting to the
//! concrete handle type (`Arc<dyn QueryHandler<Q>>`, ...), so a single map can
//! hold differently-typed handlers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::message::MessageKind;

#[derive(Default)]
pub(crate) struct SingleHandlerRegistry {
    entries: RwLock<HashMap<MessageKind, Box<dyn Any + Send + Sync>>>,
}

impl SingleHandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the replaced value.
    pub(crate) fn insert<T>(&self, kind: MessageKind, value: T) -> Option<T>
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .insert(kind, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub(crate) fn get<T>(&self, kind: MessageKind) -> Option<T>
    where
        T: Any + Clone,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&kind)?.downcast_ref::<T>().cloned()
    }

    pub(crate) fn contains(&self, kind: MessageKind) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(&kind)
    }

    pub(crate) fn remove(&self, kind: MessageKind) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&kind).is_some()
    }

    /// Remove the entry only if `matches` accepts the stored value.
    pub(crate) fn remove_if<T>(&self, kind: MessageKind, matches: impl FnOnce(&T) -> bool) -> bool
    where
        T: Any,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let hit = entries
            .get(&kind)
            .and_then(|value| value.downcast_ref::<T>())
            .is_some_and(matches);
        if hit {
            entries.remove(&kind);
        }
        hit
    }
}

impl core::fmt::Debug for SingleHandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_set()
            .entries(entries.keys().map(|kind| kind.name()))
            .finish()
    }
}
