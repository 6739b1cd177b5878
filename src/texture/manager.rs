// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle of one natively-backed texture
//!
//! Every operation is checked against the current [`TextureState`] before it
//! suspends, so an illegal call is rejected immediately and never queued.
//! Legal operations register a completion with the correlator and submit their
//! render command. The completion itself moves the texture to its next state
//! and releases the operation gate; the caller's future only observes the
//! result. Dropping that future (for instance on a `tokio::time::timeout`) does
//! not strand the texture: a late completion still lands, and an operation
//! dropped before it was submitted undoes its transitional state.
//!
//! Completions are not timed out here. A render side that never reports back
//! leaves the texture in its transitional state until the correlator abandons
//! the completion, which counts as a failure.

use super::backend::TexturePool;
use super::state::{TextureInfo, TextureState};
use crate::errors::TextureError;
use crate::native::{
    DestroyDescriptor, OpCorrelator, RenderCommand, RenderQueue, SetupDescriptor,
    UpdateDescriptor,
};
use crate::types::{NativeTextureId, OpStatus, Resolution, SourceId, TextureFormat};
use futures::channel::oneshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// Lifecycle state plus whether a native operation is outstanding
struct Slot {
    state: TextureState,
    in_flight: bool,
}

/// State the completions mutate, shared with the correlator
struct Shared {
    pool: Arc<dyn TexturePool>,
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_create(
        &self,
        info: TextureInfo,
        token: u64,
        outcome: Result<OpStatus, TextureError>,
    ) -> Result<TextureInfo, TextureError> {
        let mut slot = self.lock();
        slot.in_flight = false;
        match (outcome, slot.state) {
            (Ok(OpStatus::Succeeded), TextureState::Creating { .. }) => {
                slot.state = TextureState::Ready { info };
                info!(texture = %info.id, resolution = %info.resolution, token, "Texture ready");
                Ok(info)
            }
            (Ok(OpStatus::Succeeded), _) => {
                // Set up natively; the pending destroy tears it down
                info!(texture = %info.id, "Texture created while destroy was pending");
                Err(TextureError::DestroyRequested)
            }
            (outcome, current) => {
                self.pool.release(info.id);
                let destroying = current.is_destroying();
                slot.state = if destroying {
                    TextureState::Destroying { texture: None }
                } else {
                    TextureState::Uninitialized
                };
                drop(slot);

                let err = match outcome {
                    Ok(_) => TextureError::NativeFailed {
                        operation: "create",
                        texture: info.id,
                    },
                    Err(e) => e,
                };
                error!(texture = %info.id, error = %err, "Texture creation failed");
                if destroying {
                    Err(TextureError::DestroyRequested)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn finish_update(
        &self,
        info: TextureInfo,
        source: SourceId,
        token: u64,
        outcome: Result<OpStatus, TextureError>,
    ) -> Result<(), TextureError> {
        {
            let mut slot = self.lock();
            slot.in_flight = false;
            if let TextureState::Updating { .. } = slot.state {
                slot.state = TextureState::Ready { info };
            }
        }

        match outcome {
            Ok(OpStatus::Succeeded) => {
                debug!(texture = %info.id, source = %source, token, "Texture updated");
                Ok(())
            }
            Ok(OpStatus::Failed) => Err(TextureError::NativeFailed {
                operation: "update",
                texture: info.id,
            }),
            Err(e) => Err(e),
        }
    }

    fn finish_destroy(
        &self,
        info: TextureInfo,
        outcome: Result<OpStatus, TextureError>,
    ) -> Result<(), TextureError> {
        self.pool.release(info.id);
        {
            let mut slot = self.lock();
            slot.in_flight = false;
            slot.state = TextureState::Destroyed;
        }

        match outcome {
            Ok(OpStatus::Succeeded) => {
                info!(texture = %info.id, "Texture destroyed");
                Ok(())
            }
            Ok(OpStatus::Failed) => {
                let err = TextureError::NativeFailed {
                    operation: "destroy",
                    texture: info.id,
                };
                warn!(error = %err, "Texture destroyed after failed native teardown");
                Err(err)
            }
            Err(e) => {
                warn!(error = %e, "Texture destroyed after failed native teardown");
                Err(e)
            }
        }
    }

    /// Create dropped or preempted before its setup was submitted
    fn abandon_create(&self, info: TextureInfo) {
        self.pool.release(info.id);
        let mut slot = self.lock();
        match slot.state {
            TextureState::Creating { .. } => slot.state = TextureState::Uninitialized,
            TextureState::Destroying { .. } => {
                slot.state = TextureState::Destroying { texture: None }
            }
            _ => {}
        }
        info!(texture = %info.id, state = slot.state.name(), "Create abandoned before submit");
    }

    /// Update dropped before its command was submitted
    fn abandon_update(&self, info: TextureInfo) {
        let mut slot = self.lock();
        if let TextureState::Updating { .. } = slot.state {
            slot.state = TextureState::Ready { info };
        }
        debug!(texture = %info.id, "Update abandoned before submit");
    }

    /// Destroy dropped while waiting for the operation ahead of it
    fn abandon_destroy(&self, previous: TextureState) {
        let mut slot = self.lock();
        let restored = match slot.state {
            // The operation ahead still completes against its own state
            TextureState::Destroying { texture: Some(_) } if slot.in_flight => previous,
            TextureState::Destroying { texture: Some(info) } => TextureState::Ready { info },
            TextureState::Destroying { texture: None } => TextureState::Uninitialized,
            other => other,
        };
        slot.state = restored;
        info!(state = slot.state.name(), "Destroy abandoned before submit");
    }
}

/// Runs `undo` on drop unless disarmed
struct Rollback<F: FnOnce()> {
    undo: Option<F>,
}

impl<F: FnOnce()> Rollback<F> {
    fn new(undo: F) -> Self {
        Self { undo: Some(undo) }
    }

    fn disarm(mut self) {
        self.undo = None;
    }
}

impl<F: FnOnce()> Drop for Rollback<F> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

type Finish<T> = Box<dyn FnOnce(Result<OpStatus, TextureError>) -> Result<T, TextureError> + Send>;

/// A submitted operation: its state transition, the waiting caller and the gate.
///
/// Resolved exactly once. If the correlator drops it without completing, the
/// operation resolves as `CompletionDropped`.
struct PendingOp<T> {
    id: NativeTextureId,
    finish: Option<Finish<T>>,
    sender: Option<oneshot::Sender<Result<T, TextureError>>>,
    _gate: OwnedMutexGuard<()>,
}

impl<T> PendingOp<T> {
    fn resolve(&mut self, outcome: Result<OpStatus, TextureError>) {
        if let Some(finish) = self.finish.take() {
            let result = finish(outcome);
            if let Some(sender) = self.sender.take() {
                // The caller may have stopped waiting
                let _ = sender.send(result);
            }
        }
    }
}

impl<T> Drop for PendingOp<T> {
    fn drop(&mut self) {
        self.resolve(Err(TextureError::CompletionDropped(self.id)));
    }
}

/// Owner of a single texture and its native counterpart
pub struct TextureLifecycleManager {
    shared: Arc<Shared>,
    correlator: Arc<dyn OpCorrelator>,
    queue: RenderQueue,
    format: TextureFormat,
    /// Held by whichever native operation is in flight until it completes
    gate: Arc<tokio::sync::Mutex<()>>,
    next_token: AtomicU64,
}

impl TextureLifecycleManager {
    pub fn new(
        pool: Arc<dyn TexturePool>,
        correlator: Arc<dyn OpCorrelator>,
        queue: RenderQueue,
        format: TextureFormat,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pool,
                slot: Mutex::new(Slot {
                    state: TextureState::Uninitialized,
                    in_flight: false,
                }),
            }),
            correlator,
            queue,
            format,
            gate: Arc::new(tokio::sync::Mutex::new(())),
            next_token: AtomicU64::new(1),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TextureState {
        self.shared.lock().state
    }

    /// The texture, while it is usable
    pub fn info(&self) -> Option<TextureInfo> {
        match self.shared.lock().state {
            TextureState::Ready { info } | TextureState::Updating { info } => Some(info),
            _ => None,
        }
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    fn reject(&self, operation: &'static str, state: &TextureState) -> TextureError {
        warn!(operation, state = state.name(), "Rejected texture operation");
        TextureError::InvalidState {
            operation,
            state: state.name(),
        }
    }

    /// Allocate a texture and set it up on the render side.
    ///
    /// Legal only once, from `Uninitialized`. On failure the allocation is
    /// released and the manager returns to `Uninitialized`.
    pub async fn create(
        &self,
        resolution: Resolution,
        timestamp_ns: i64,
    ) -> Result<TextureInfo, TextureError> {
        let info = self.begin_create(resolution)?;
        let shared = Arc::clone(&self.shared);
        let rollback = Rollback::new(move || shared.abandon_create(info));

        let gate = Arc::clone(&self.gate).lock_owned().await;
        if self.shared.lock().state.is_destroying() {
            // Destroy arrived before anything was submitted
            drop(rollback);
            return Err(TextureError::DestroyRequested);
        }
        rollback.disarm();

        let token = self.next_token();
        let command = RenderCommand::setup(SetupDescriptor::new(
            info.id,
            info.resolution,
            info.format,
            timestamp_ns,
            token,
        ));
        let shared = Arc::clone(&self.shared);
        self.run_native(info.id, "create", command, gate, move |outcome| {
            shared.finish_create(info, token, outcome)
        })
        .await
    }

    /// Synchronous part of create: validate, allocate, enter `Creating`
    fn begin_create(&self, resolution: Resolution) -> Result<TextureInfo, TextureError> {
        {
            let slot = self.shared.lock();
            if slot.state != TextureState::Uninitialized {
                return Err(self.reject("create", &slot.state));
            }
        }

        if !resolution.is_valid() {
            warn!(resolution = %resolution, "Rejected texture size");
            return Err(TextureError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }

        let id = self.shared.pool.allocate(resolution, self.format)?;
        let info = TextureInfo {
            id,
            resolution,
            format: self.format,
        };

        let mut slot = self.shared.lock();
        if slot.state != TextureState::Uninitialized {
            // Lost a race with another create or a destroy
            let err = self.reject("create", &slot.state);
            drop(slot);
            self.shared.pool.release(id);
            return Err(err);
        }
        slot.state = TextureState::Creating { info };
        debug!(texture = %id, resolution = %resolution, "Texture creating");
        Ok(info)
    }

    /// Copy the registered source surface `source` into the texture.
    ///
    /// Legal only in `Ready` with `source` registered in the pool; the manager
    /// is `Updating` until the native update completes and returns to `Ready`
    /// whatever the outcome.
    pub async fn update(&self, source: SourceId) -> Result<(), TextureError> {
        let info = {
            let mut slot = self.shared.lock();
            let TextureState::Ready { info } = slot.state else {
                return Err(self.reject("update", &slot.state));
            };
            if !self.shared.pool.has_source(source) {
                warn!(texture = %info.id, source = %source, "Update from unregistered source");
                return Err(TextureError::UnknownSource(source));
            }
            slot.state = TextureState::Updating { info };
            info
        };
        let shared = Arc::clone(&self.shared);
        let rollback = Rollback::new(move || shared.abandon_update(info));

        let gate = Arc::clone(&self.gate).lock_owned().await;
        if self.shared.lock().state.is_destroying() {
            rollback.disarm();
            return Err(TextureError::DestroyRequested);
        }
        rollback.disarm();

        let token = self.next_token();
        let command = RenderCommand::update(UpdateDescriptor::new(info.id, source, token));
        let shared = Arc::clone(&self.shared);
        self.run_native(info.id, "update", command, gate, move |outcome| {
            shared.finish_update(info, source, token, outcome)
        })
        .await
    }

    /// Tear the texture down and release it.
    ///
    /// Legal from any non-terminal state. An operation already in flight is
    /// allowed to finish first; further updates are rejected from the moment
    /// this is called. Once submitted, the teardown ends in `Destroyed` even if
    /// it fails natively or the caller stops waiting.
    pub async fn destroy(&self) -> Result<(), TextureError> {
        let previous = {
            let mut slot = self.shared.lock();
            let previous = slot.state;
            match previous {
                TextureState::Uninitialized => {
                    slot.state = TextureState::Destroyed;
                    info!("Destroyed texture that was never created");
                    return Ok(());
                }
                TextureState::Destroying { .. } | TextureState::Destroyed => {
                    return Err(self.reject("destroy", &previous));
                }
                TextureState::Creating { info }
                | TextureState::Ready { info }
                | TextureState::Updating { info } => {
                    slot.state = TextureState::Destroying {
                        texture: Some(info),
                    };
                }
            }
            previous
        };
        let shared = Arc::clone(&self.shared);
        let rollback = Rollback::new(move || shared.abandon_destroy(previous));

        let gate = Arc::clone(&self.gate).lock_owned().await;
        rollback.disarm();

        let texture = match self.shared.lock().state {
            TextureState::Destroying { texture } => texture,
            _ => None,
        };

        match texture {
            None => {
                self.shared.lock().state = TextureState::Destroyed;
                info!("Texture destroyed before it was set up");
                Ok(())
            }
            Some(info) => {
                let token = self.next_token();
                let command = RenderCommand::destroy(DestroyDescriptor::new(info.id, token));
                let shared = Arc::clone(&self.shared);
                self.run_native(info.id, "destroy", command, gate, move |outcome| {
                    shared.finish_destroy(info, outcome)
                })
                .await
            }
        }
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `finish` as the completion for `id`, submit `command` and wait
    /// for the result.
    ///
    /// `gate` stays held until `finish` has run, whether or not this future is
    /// still being polled.
    async fn run_native<T: Send + 'static>(
        &self,
        id: NativeTextureId,
        operation: &'static str,
        command: RenderCommand,
        gate: OwnedMutexGuard<()>,
        finish: impl FnOnce(Result<OpStatus, TextureError>) -> Result<T, TextureError> + Send + 'static,
    ) -> Result<T, TextureError> {
        let (sender, receiver) = oneshot::channel();
        self.shared.lock().in_flight = true;
        let pending = Arc::new(Mutex::new(Some(PendingOp {
            id,
            finish: Some(Box::new(finish)),
            sender: Some(sender),
            _gate: gate,
        })));

        let completion = Arc::clone(&pending);
        let submitted = self
            .correlator
            .register(
                id,
                Box::new(move |status| {
                    let op = completion
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    if let Some(mut op) = op {
                        op.resolve(Ok(status));
                    }
                }),
            )
            .map_err(TextureError::from)
            .and_then(|()| {
                self.queue.submit(command).map_err(|e| {
                    self.correlator.cancel(id);
                    error!(texture = %id, operation, error = %e, "Failed to submit render command");
                    TextureError::from(e)
                })
            });

        if let Err(e) = submitted {
            let op = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(mut op) = op {
                op.resolve(Err(e));
            }
        }
        drop(pending);

        receiver
            .await
            .unwrap_or(Err(TextureError::CompletionDropped(id)))
    }
}

impl Drop for TextureLifecycleManager {
    fn drop(&mut self) {
        let state = self.shared.lock().state;
        if !matches!(
            state,
            TextureState::Uninitialized | TextureState::Destroyed
        ) {
            warn!(state = state.name(), "TextureLifecycleManager dropped without destroy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeOpCorrelator, RenderEventHandler, RenderPump, render_channel};
    use crate::shaders::RgbaSurface;
    use crate::texture::HeadlessTexturePool;
    use image::RgbaImage;
    use futures::poll;
    use std::pin::pin;
    use std::task::Poll;

    /// Completes every render event with a fixed status
    struct Completer {
        correlator: Arc<NativeOpCorrelator>,
        status: OpStatus,
        events: Vec<u32>,
    }

    impl RenderEventHandler for Completer {
        fn on_render_event(&mut self, command: RenderCommand) {
            let mut id = [0u8; 4];
            id.copy_from_slice(&command.payload[..4]);
            self.events.push(command.event_id);
            self.correlator
                .complete(NativeTextureId(u32::from_ne_bytes(id)), self.status);
        }
    }

    struct Harness {
        manager: TextureLifecycleManager,
        pool: Arc<HeadlessTexturePool>,
        pump: RenderPump,
        completer: Completer,
    }

    impl Harness {
        fn new() -> Self {
            let pool = Arc::new(HeadlessTexturePool::new());
            let correlator = Arc::new(NativeOpCorrelator::new());
            let (queue, pump) = render_channel("test");
            for source in [1, 3] {
                pool.register_source(
                    SourceId(source),
                    RgbaSurface::Cpu(Arc::new(RgbaImage::new(4, 4))),
                )
                .unwrap();
            }
            let manager = TextureLifecycleManager::new(
                pool.clone(),
                correlator.clone(),
                queue,
                TextureFormat::Rgba8Unorm,
            );
            Self {
                manager,
                pool,
                pump,
                completer: Completer {
                    correlator,
                    status: OpStatus::Succeeded,
                    events: Vec::new(),
                },
            }
        }

        async fn ready(&mut self) -> TextureInfo {
            let mut create = pin!(self.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
            self.pump.pump(&mut self.completer);
            match poll!(create.as_mut()) {
                Poll::Ready(result) => result.unwrap(),
                Poll::Pending => panic!("create still pending after completion"),
            }
        }
    }

    #[tokio::test]
    async fn test_create_update_destroy_sequence() {
        let mut h = Harness::new();
        let res = Resolution::new(4, 4);

        let info = {
            let mut create = pin!(h.manager.create(res, 0));
            assert!(poll!(create.as_mut()).is_pending());
            assert!(matches!(h.manager.state(), TextureState::Creating { .. }));
            h.pump.pump(&mut h.completer);
            match poll!(create.as_mut()) {
                Poll::Ready(result) => result.unwrap(),
                Poll::Pending => panic!("create still pending after completion"),
            }
        };
        assert_eq!(h.manager.state(), TextureState::Ready { info });
        assert_eq!(h.manager.info(), Some(info));

        {
            let mut update = pin!(h.manager.update(SourceId(1)));
            assert!(poll!(update.as_mut()).is_pending());
            assert_eq!(h.manager.state(), TextureState::Updating { info });
            h.pump.pump(&mut h.completer);
            assert!(matches!(poll!(update.as_mut()), Poll::Ready(Ok(()))));
        }
        assert_eq!(h.manager.state(), TextureState::Ready { info });

        {
            let mut destroy = pin!(h.manager.destroy());
            assert!(poll!(destroy.as_mut()).is_pending());
            assert_eq!(
                h.manager.state(),
                TextureState::Destroying {
                    texture: Some(info)
                }
            );
            h.pump.pump(&mut h.completer);
            assert!(matches!(poll!(destroy.as_mut()), Poll::Ready(Ok(()))));
        }
        assert_eq!(h.manager.state(), TextureState::Destroyed);
        assert!(!h.pool.contains(info.id));
        assert_eq!(h.completer.events, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn test_update_while_creating_is_rejected() {
        let h = Harness::new();
        let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
        assert!(poll!(create.as_mut()).is_pending());

        assert_eq!(
            h.manager.update(SourceId(1)).await,
            Err(TextureError::InvalidState {
                operation: "update",
                state: "Creating"
            })
        );
        assert!(matches!(h.manager.state(), TextureState::Creating { .. }));
    }

    #[tokio::test]
    async fn test_update_before_create_is_rejected() {
        let h = Harness::new();
        assert!(matches!(
            h.manager.update(SourceId(1)).await,
            Err(TextureError::InvalidState { .. })
        ));
        assert_eq!(h.manager.state(), TextureState::Uninitialized);
    }

    #[tokio::test]
    async fn test_second_create_is_rejected() {
        let mut h = Harness::new();
        {
            let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
            h.pump.pump(&mut h.completer);
            assert!(matches!(poll!(create.as_mut()), Poll::Ready(Ok(_))));
        }
        assert_eq!(
            h.manager.create(Resolution::new(4, 4), 0).await,
            Err(TextureError::InvalidState {
                operation: "create",
                state: "Ready"
            })
        );
        assert_eq!(h.pool.texture_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_during_create_waits_for_it() {
        let mut h = Harness::new();
        let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
        assert!(poll!(create.as_mut()).is_pending());

        let mut destroy = pin!(h.manager.destroy());
        assert!(poll!(destroy.as_mut()).is_pending());
        assert!(matches!(
            h.manager.state(),
            TextureState::Destroying { texture: Some(_) }
        ));

        // Further operations are refused while destroy is pending
        assert!(h.manager.update(SourceId(1)).await.is_err());
        assert!(matches!(
            h.manager.destroy().await,
            Err(TextureError::InvalidState { .. })
        ));

        // Complete the setup; create reports the destroy
        h.pump.pump(&mut h.completer);
        assert_eq!(
            poll!(create.as_mut()),
            Poll::Ready(Err(TextureError::DestroyRequested))
        );

        // Destroy now submits its own command
        assert!(poll!(destroy.as_mut()).is_pending());
        h.pump.pump(&mut h.completer);
        assert_eq!(poll!(destroy.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(h.manager.state(), TextureState::Destroyed);
        assert_eq!(h.pool.texture_count(), 0);
        assert_eq!(h.completer.events, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_create_returns_to_uninitialized() {
        let mut h = Harness::new();
        h.completer.status = OpStatus::Failed;
        {
            let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
            h.pump.pump(&mut h.completer);
            assert!(matches!(
                poll!(create.as_mut()),
                Poll::Ready(Err(TextureError::NativeFailed {
                    operation: "create",
                    ..
                }))
            ));
        }
        assert_eq!(h.manager.state(), TextureState::Uninitialized);
        assert_eq!(h.pool.texture_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_update_returns_to_ready() {
        let mut h = Harness::new();
        let info = {
            let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
            h.pump.pump(&mut h.completer);
            match poll!(create.as_mut()) {
                Poll::Ready(result) => result.unwrap(),
                Poll::Pending => panic!("create still pending"),
            }
        };

        h.completer.status = OpStatus::Failed;
        {
            let mut update = pin!(h.manager.update(SourceId(3)));
            assert!(poll!(update.as_mut()).is_pending());
            h.pump.pump(&mut h.completer);
            assert_eq!(
                poll!(update.as_mut()),
                Poll::Ready(Err(TextureError::NativeFailed {
                    operation: "update",
                    texture: info.id
                }))
            );
        }
        assert_eq!(h.manager.state(), TextureState::Ready { info });
    }

    #[tokio::test]
    async fn test_destroy_uninitialized_and_twice() {
        let h = Harness::new();
        assert_eq!(h.manager.destroy().await, Ok(()));
        assert_eq!(h.manager.state(), TextureState::Destroyed);
        assert_eq!(
            h.manager.destroy().await,
            Err(TextureError::InvalidState {
                operation: "destroy",
                state: "Destroyed"
            })
        );
        assert!(h.manager.update(SourceId(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_fails_create_cleanly() {
        let h = Harness::new();
        let Harness { manager, pool, pump, .. } = h;
        drop(pump);

        assert_eq!(
            manager.create(Resolution::new(4, 4), 0).await,
            Err(TextureError::Render(crate::errors::RenderError::QueueClosed))
        );
        assert_eq!(manager.state(), TextureState::Uninitialized);
        assert_eq!(pool.texture_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_resolution_rejected() {
        let h = Harness::new();
        assert_eq!(
            h.manager.create(Resolution::new(0, 0), 0).await,
            Err(TextureError::InvalidResolution {
                width: 0,
                height: 0
            })
        );
        assert_eq!(h.manager.state(), TextureState::Uninitialized);
    }

    #[tokio::test]
    async fn test_late_create_completion_after_caller_gave_up() {
        let mut h = Harness::new();
        {
            let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
        }
        assert!(matches!(h.manager.state(), TextureState::Creating { .. }));

        h.pump.pump(&mut h.completer);
        let info = h.manager.info().expect("texture usable after late completion");
        assert_eq!(h.manager.state(), TextureState::Ready { info });
        assert_eq!(h.pool.texture_count(), 1);

        let mut update = pin!(h.manager.update(SourceId(1)));
        assert!(poll!(update.as_mut()).is_pending());
        h.pump.pump(&mut h.completer);
        assert_eq!(poll!(update.as_mut()), Poll::Ready(Ok(())));
    }

    #[tokio::test]
    async fn test_late_update_completion_after_caller_gave_up() {
        let mut h = Harness::new();
        let info = h.ready().await;
        {
            let mut update = pin!(h.manager.update(SourceId(1)));
            assert!(poll!(update.as_mut()).is_pending());
        }
        assert_eq!(h.manager.state(), TextureState::Updating { info });

        h.pump.pump(&mut h.completer);
        assert_eq!(h.manager.state(), TextureState::Ready { info });

        let mut retry = pin!(h.manager.update(SourceId(3)));
        assert!(poll!(retry.as_mut()).is_pending());
        h.pump.pump(&mut h.completer);
        assert_eq!(poll!(retry.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(h.completer.events, vec![1, 3, 3]);
    }

    #[tokio::test]
    async fn test_abandoned_create_releases_allocation() {
        let h = Harness::new();
        {
            let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
            assert!(poll!(create.as_mut()).is_pending());
        }
        assert_eq!(h.completer.correlator.abandon_all(), 1);

        assert_eq!(h.manager.state(), TextureState::Uninitialized);
        assert_eq!(h.pool.texture_count(), 0);
        let mut retry = pin!(h.manager.create(Resolution::new(4, 4), 0));
        assert!(poll!(retry.as_mut()).is_pending());
        assert!(matches!(h.manager.state(), TextureState::Creating { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_create_reports_dropped_completion() {
        let h = Harness::new();
        let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
        assert!(poll!(create.as_mut()).is_pending());
        h.completer.correlator.abandon_all();

        assert!(matches!(
            poll!(create.as_mut()),
            Poll::Ready(Err(TextureError::CompletionDropped(_)))
        ));
        assert_eq!(h.manager.state(), TextureState::Uninitialized);
    }

    #[tokio::test]
    async fn test_destroy_dropped_while_waiting_restores_state() {
        let mut h = Harness::new();
        let mut create = pin!(h.manager.create(Resolution::new(4, 4), 0));
        assert!(poll!(create.as_mut()).is_pending());
        {
            let mut destroy = pin!(h.manager.destroy());
            assert!(poll!(destroy.as_mut()).is_pending());
        }
        assert!(matches!(h.manager.state(), TextureState::Creating { .. }));

        h.pump.pump(&mut h.completer);
        let info = match poll!(create.as_mut()) {
            Poll::Ready(result) => result.unwrap(),
            Poll::Pending => panic!("create still pending after completion"),
        };
        assert_eq!(h.manager.state(), TextureState::Ready { info });

        let mut destroy = pin!(h.manager.destroy());
        assert!(poll!(destroy.as_mut()).is_pending());
        h.pump.pump(&mut h.completer);
        assert_eq!(poll!(destroy.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(h.pool.texture_count(), 0);
    }

    #[tokio::test]
    async fn test_update_from_unregistered_source_is_rejected() {
        let mut h = Harness::new();
        let info = h.ready().await;
        assert_eq!(
            h.manager.update(SourceId(99)).await,
            Err(TextureError::UnknownSource(SourceId(99)))
        );
        assert_eq!(h.manager.state(), TextureState::Ready { info });
        assert_eq!(h.completer.events, vec![1]);
    }
}
