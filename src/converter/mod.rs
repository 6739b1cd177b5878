// SPDX-License-Identifier: GPL-3.0-only

//! YUV 4:2:0 to RGBA frame converter
//!
//! Frames arrive on the capture callback thread, are copied into a fresh
//! [`StagingFrame`] and posted to the render queue. There the staging planes
//! are uploaded, the staging copy is dropped, the conversion kernel runs and
//! a [`FrameProcessed`] notification goes out to every listener.
//!
//! Each frame gets its own staging copy, so several can be queued at once
//! when the render thread falls behind. Nothing is dropped under load; the
//! render queue is FIFO so notifications keep arrival order.

mod listeners;

pub use listeners::{FrameListener, FrameProcessed, ListenerId};

use crate::capture::{FrameHandler, FrameView, PlaneStrides, StagingFrame, StagingLayout};
use crate::errors::ConvertError;
use crate::native::RenderQueue;
use crate::shaders::{ConversionBackend, ConvertParams};
use crate::types::Resolution;
use futures::channel::oneshot;
use listeners::Listeners;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

struct Shared {
    resolution: Resolution,
    layout: StagingLayout,
    backend_name: &'static str,
    backend: Mutex<Box<dyn ConversionBackend>>,
    listeners: Mutex<Listeners>,
    disposed: AtomicBool,
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backend(&self) -> MutexGuard<'_, Box<dyn ConversionBackend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upload and convert one staged frame. Runs on the render thread.
    fn process(&self, staging: StagingFrame, params: ConvertParams, timestamp_ns: i64) {
        if self.disposed.load(Ordering::Acquire) {
            staging.dispose();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(timestamp_ns, "Converter disposed, skipping queued frame");
            return;
        }

        let mut backend = self.lock_backend();
        let uploaded = backend.upload(&staging, &params);
        staging.dispose();

        if let Err(e) = uploaded {
            drop(backend);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(timestamp_ns, error = %e, "Frame upload failed");
            return;
        }

        let surface = match backend.dispatch() {
            Ok(surface) => surface,
            Err(e) => {
                drop(backend);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(timestamp_ns, error = %e, "Conversion dispatch failed");
                return;
            }
        };
        drop(backend);

        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(timestamp_ns, "Frame converted");
        self.notify(FrameProcessed {
            surface,
            timestamp_ns,
        });
    }

    fn notify(&self, frame: FrameProcessed) {
        // Listeners run without the registry lock held
        let (persistent, waiters) = self.lock_listeners().take_targets();
        for waiter in waiters {
            let _ = waiter.send(frame.clone());
        }
        for listener in persistent {
            listener(&frame);
        }
    }

    fn release_backend(&self) {
        let mut backend = self.lock_backend();
        backend.release();
        debug!(backend = self.backend_name, "Conversion resources released");
    }
}

/// Removes a one-shot waiter when `next_frame` returns or is dropped
struct WaiterGuard<'a> {
    shared: &'a Shared,
    id: ListenerId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock_listeners().remove(self.id);
    }
}

/// Converts captured YUV 4:2:0 frames into RGBA surfaces of one fixed size
pub struct YuvToRgbaConverter {
    shared: Arc<Shared>,
    queue: RenderQueue,
}

impl YuvToRgbaConverter {
    /// Create a converter for frames of `resolution`.
    ///
    /// `backend` must have been created for the same resolution. Uploads,
    /// dispatches and the final release all run as tasks on `queue`.
    pub fn new(
        resolution: Resolution,
        backend: Box<dyn ConversionBackend>,
        queue: RenderQueue,
    ) -> Self {
        let backend_name = backend.name();
        info!(resolution = %resolution, backend = backend_name, "Created YUV converter");
        Self {
            shared: Arc::new(Shared {
                resolution,
                layout: StagingLayout::for_resolution(resolution),
                backend_name,
                backend: Mutex::new(backend),
                listeners: Mutex::new(Listeners::default()),
                disposed: AtomicBool::new(false),
                received: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            queue,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    /// Name of the conversion backend ("gpu" or "cpu")
    pub fn backend_name(&self) -> &'static str {
        self.shared.backend_name
    }

    /// Copy a frame and queue it for conversion.
    ///
    /// Returns true if the frame was queued. After dispose this is a silent
    /// no-op.
    pub fn on_frame_ready(&self, frame: &FrameView<'_>) -> bool {
        if self.shared.disposed.load(Ordering::Acquire) {
            trace!(timestamp_ns = frame.timestamp_ns, "Converter disposed, ignoring frame");
            return false;
        }

        if let Err(e) = frame.validate() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, timestamp_ns = frame.timestamp_ns, "Rejected frame");
            return false;
        }

        self.shared.received.fetch_add(1, Ordering::Relaxed);

        if !self
            .shared
            .layout
            .holds_luma(self.shared.resolution, frame.strides)
        {
            debug!(
                y_row_stride = frame.strides.y_row_stride,
                width = self.shared.resolution.width,
                timestamp_ns = frame.timestamp_ns,
                "Padded luma rows exceed staging capacity; top rows read as 0"
            );
        }

        let staging = StagingFrame::new(self.shared.layout);
        staging.fill_from(frame);
        let params = ConvertParams::new(self.shared.resolution, frame.strides);
        let timestamp_ns = frame.timestamp_ns;

        let shared = Arc::clone(&self.shared);
        match self
            .queue
            .post(move || shared.process(staging, params, timestamp_ns))
        {
            Ok(()) => {
                trace!(timestamp_ns, "Frame queued for conversion");
                true
            }
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(timestamp_ns, error = %e, "Failed to queue frame");
                false
            }
        }
    }

    /// FrameReady entry point taking the backend's raw arguments.
    ///
    /// # Safety
    ///
    /// Each non-null pointer must be valid for reads of its reported size for
    /// the duration of this call.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn on_frame_ready_raw(
        &self,
        y_ptr: *const u8,
        y_size: usize,
        u_ptr: *const u8,
        v_ptr: *const u8,
        uv_size: usize,
        y_row_stride: u32,
        uv_row_stride: u32,
        uv_pixel_stride: u32,
        timestamp_ns: i64,
    ) -> bool {
        if self.shared.disposed.load(Ordering::Acquire) {
            return false;
        }

        let strides = PlaneStrides {
            y_row_stride,
            uv_row_stride,
            uv_pixel_stride,
        };

        // SAFETY: forwarded from the caller's contract; the view does not
        // outlive this call
        let frame = unsafe {
            FrameView::from_raw(y_ptr, y_size, u_ptr, v_ptr, uv_size, strides, timestamp_ns)
        };

        match frame {
            Ok(frame) => self.on_frame_ready(&frame),
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, timestamp_ns, "Rejected raw frame");
                false
            }
        }
    }

    /// Call `listener` on the render thread for every converted frame
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&FrameProcessed) + Send + Sync + 'static,
    {
        self.shared.lock_listeners().subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.lock_listeners().remove(id)
    }

    /// Registered listeners, including pending `next_frame` waiters
    pub fn listener_count(&self) -> usize {
        self.shared.lock_listeners().len()
    }

    /// Wait for the next converted frame.
    ///
    /// The temporary listener is removed when this returns, is cancelled
    /// through `cancel`, or is dropped.
    pub async fn next_frame(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FrameProcessed, ConvertError> {
        let (sender, receiver) = oneshot::channel();
        let id = {
            let mut listeners = self.shared.lock_listeners();
            // Checked under the lock so dispose cannot miss this waiter
            if self.shared.disposed.load(Ordering::Acquire) {
                return Err(ConvertError::Disposed);
            }
            listeners.add_waiter(sender)
        };
        let _guard = WaiterGuard {
            shared: &self.shared,
            id,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Frame wait cancelled");
                Err(ConvertError::Cancelled)
            }
            frame = receiver => frame.map_err(|_| ConvertError::Disposed),
        }
    }

    /// Release the conversion resources. Idempotent.
    ///
    /// Pending `next_frame` waiters fail with `Disposed`. The release runs on
    /// the render thread, or inline if the render queue is already gone.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let cleared = self.shared.lock_listeners().clear();

        let shared = Arc::clone(&self.shared);
        if self.queue.post(move || shared.release_backend()).is_err() {
            debug!("Render queue closed, releasing conversion resources inline");
            self.shared.release_backend();
        }

        info!(
            received = self.received_count(),
            processed = self.processed_count(),
            dropped = self.dropped_count(),
            listeners = cleared,
            "Disposed YUV converter"
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Frames accepted for conversion
    pub fn received_count(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Frames converted and announced
    pub fn processed_count(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Frames rejected or lost to a failed upload or dispatch
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl FrameHandler for YuvToRgbaConverter {
    fn on_frame(&self, frame: &FrameView<'_>) {
        self.on_frame_ready(frame);
    }
}

impl Drop for YuvToRgbaConverter {
    fn drop(&mut self) {
        if !self.shared.disposed.load(Ordering::Acquire) {
            warn!(
                resolution = %self.shared.resolution,
                "YuvToRgbaConverter dropped without dispose"
            );
        }
    }
}
