//! Lifecycle bookkeeping shared by the quality and anomaly models
//!
//! A model's fitted state is an immutable bundle behind an `Arc`. Training
//! and loading build the next bundle without holding the lock and install it
//! with a single write; readers clone the `Arc` and score outside the lock.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Untrained,
    Trained,
    Persisted,
    Loaded,
}

impl ModelState {
    /// True once a fitted bundle is installed
    pub fn is_ready(&self) -> bool {
        !matches!(self, ModelState::Untrained)
    }
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Untrained => write!(f, "untrained"),
            ModelState::Trained => write!(f, "trained"),
            ModelState::Persisted => write!(f, "persisted"),
            ModelState::Loaded => write!(f, "loaded"),
        }
    }
}

#[derive(Debug)]
struct Slot<B> {
    bundle: Option<Arc<B>>,
    state: ModelState,
}

/// Lock-guarded holder of the current bundle and its lifecycle state
#[derive(Debug)]
pub(crate) struct ModelSlot<B> {
    inner: RwLock<Slot<B>>,
}

impl<B> Default for ModelSlot<B> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Slot {
                bundle: None,
                state: ModelState::Untrained,
            }),
        }
    }
}

impl<B> ModelSlot<B> {
    /// Current bundle, if any. Callers score against this snapshot.
    pub fn snapshot(&self) -> Option<Arc<B>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bundle
            .clone()
    }

    pub fn state(&self) -> ModelState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Replace the bundle and state in one write
    pub fn install(&self, bundle: Arc<B>, state: ModelState) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        slot.bundle = Some(bundle);
        slot.state = state;
    }

    /// Record that `bundle` reached disk, unless it was replaced meanwhile
    pub fn mark_persisted(&self, bundle: &Arc<B>) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if slot
            .bundle
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, bundle))
        {
            slot.state = ModelState::Persisted;
        }
    }
}
