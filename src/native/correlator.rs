// SPDX-License-Identifier: GPL-3.0-only

//! Completion correlation for asynchronous native operations
//!
//! Every operation sent to the render side is keyed by the texture id it
//! targets. When the render side reports completion for an id, the
//! continuation registered for it runs exactly once, on the thread that
//! reported completion.

use crate::errors::CorrelatorError;
use crate::types::{NativeTextureId, OpStatus};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Work to run when a native operation completes
pub type Continuation = Box<dyn FnOnce(OpStatus) + Send>;

/// Registry of pending native operations
pub trait OpCorrelator: Send + Sync {
    /// Register the continuation for `id`.
    ///
    /// At most one continuation may be pending per id; a second registration
    /// is rejected and leaves the first in place.
    fn register(&self, id: NativeTextureId, continuation: Continuation)
    -> Result<(), CorrelatorError>;

    /// Run and remove the continuation for `id`. Returns false if none was
    /// pending.
    fn complete(&self, id: NativeTextureId, status: OpStatus) -> bool;

    /// Remove the continuation for `id` without running it
    fn cancel(&self, id: NativeTextureId) -> bool;

    /// Number of pending continuations
    fn pending(&self) -> usize;
}

/// Mutex-guarded map from native id to its pending continuation
#[derive(Default)]
pub struct NativeOpCorrelator {
    pending: Mutex<HashMap<NativeTextureId, Continuation>>,
}

impl NativeOpCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every pending continuation without running it.
    ///
    /// Used once the render side is gone; waiters observe their completion
    /// being dropped instead of hanging.
    pub fn abandon_all(&self) -> usize {
        let abandoned: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Abandoning pending native operations");
        }
        abandoned.len()
    }
}

impl OpCorrelator for NativeOpCorrelator {
    fn register(
        &self,
        id: NativeTextureId,
        continuation: Continuation,
    ) -> Result<(), CorrelatorError> {
        if !id.is_valid() {
            warn!(texture = %id, "Refusing to register continuation for invalid id");
            return Err(CorrelatorError::InvalidId(id));
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&id) {
            warn!(texture = %id, "Operation already pending, rejecting registration");
            return Err(CorrelatorError::AlreadyPending(id));
        }
        pending.insert(id, continuation);
        trace!(texture = %id, "Continuation registered");
        Ok(())
    }

    fn complete(&self, id: NativeTextureId, status: OpStatus) -> bool {
        let continuation = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        // Lock is released before running the continuation so it may register again
        match continuation {
            Some(continuation) => {
                trace!(texture = %id, ?status, "Completing operation");
                continuation(status);
                true
            }
            None => {
                debug!(texture = %id, ?status, "Completion for unknown id ignored");
                false
            }
        }
    }

    fn cancel(&self, id: NativeTextureId) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
