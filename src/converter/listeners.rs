// SPDX-License-Identifier: GPL-3.0-only

//! Frame-processed listeners and one-shot waiters

use crate::shaders::RgbaSurface;
use futures::channel::oneshot;
use std::collections::HashMap;
use std::sync::Arc;

/// Notification raised after a frame has been converted
#[derive(Debug, Clone)]
pub struct FrameProcessed {
    /// Destination surface holding the converted frame
    pub surface: RgbaSurface,
    /// Capture timestamp of the source frame, nanoseconds
    pub timestamp_ns: i64,
}

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type FrameListener = Arc<dyn Fn(&FrameProcessed) + Send + Sync>;

#[derive(Default)]
pub(super) struct Listeners {
    next_id: u64,
    persistent: HashMap<ListenerId, FrameListener>,
    waiters: HashMap<ListenerId, oneshot::Sender<FrameProcessed>>,
}

impl Listeners {
    fn allocate_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub(super) fn subscribe(&mut self, listener: FrameListener) -> ListenerId {
        let id = self.allocate_id();
        self.persistent.insert(id, listener);
        id
    }

    pub(super) fn add_waiter(&mut self, sender: oneshot::Sender<FrameProcessed>) -> ListenerId {
        let id = self.allocate_id();
        self.waiters.insert(id, sender);
        id
    }

    /// Remove a listener or waiter. Returns true if it was registered.
    pub(super) fn remove(&mut self, id: ListenerId) -> bool {
        self.persistent.remove(&id).is_some() || self.waiters.remove(&id).is_some()
    }

    pub(super) fn len(&self) -> usize {
        self.persistent.len() + self.waiters.len()
    }

    /// Everything the next notification goes to. Waiters are consumed.
    pub(super) fn take_targets(
        &mut self,
    ) -> (Vec<FrameListener>, Vec<oneshot::Sender<FrameProcessed>>) {
        let persistent = self.persistent.values().cloned().collect();
        let waiters = self.waiters.drain().map(|(_, sender)| sender).collect();
        (persistent, waiters)
    }

    /// Drop every listener; pending waiters observe a closed channel
    pub(super) fn clear(&mut self) -> usize {
        let count = self.len();
        self.persistent.clear();
        self.waiters.clear();
        count
    }
}
