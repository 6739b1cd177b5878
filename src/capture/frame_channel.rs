// SPDX-License-Identifier: GPL-3.0-only

//! Frame-ready entry point for the capture backend
//!
//! The backend calls in on its own callback thread. The channel validates the
//! frame and hands it synchronously to the registered handler, which must copy
//! whatever it needs before returning.

use super::frame::{FrameView, PlaneStrides};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{trace, warn};

/// Receiver of validated frames.
///
/// Called on the capture callback thread. Implementations must not retain
/// the borrowed planes past the call.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: &FrameView<'_>);
}

/// Validating forwarder between the capture backend and one frame handler
#[derive(Default)]
pub struct FrameChannel {
    handler: RwLock<Option<Arc<dyn FrameHandler>>>,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel already connected to `handler`
    pub fn with_handler(handler: Arc<dyn FrameHandler>) -> Self {
        let channel = Self::new();
        channel.set_handler(handler);
        channel
    }

    /// Replace the frame handler
    pub fn set_handler(&self, handler: Arc<dyn FrameHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Disconnect the handler; later frames are dropped
    pub fn clear_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Deliver one frame. Returns true if a handler received it.
    pub fn deliver(&self, frame: &FrameView<'_>) -> bool {
        if let Err(e) = frame.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, timestamp_ns = frame.timestamp_ns, "Rejected frame");
            return false;
        }

        // Clone the handler out so the lock is not held while it copies
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(handler) = handler else {
            trace!(timestamp_ns = frame.timestamp_ns, "No frame handler, dropping frame");
            return false;
        };

        handler.on_frame(frame);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// FrameReady entry point taking the backend's raw arguments.
    ///
    /// Null or zero-size planes are rejected and logged; nothing is retained
    /// past the call.
    ///
    /// # Safety
    ///
    /// Each non-null pointer must be valid for reads of its reported size for
    /// the duration of this call.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn deliver_raw(
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
        let strides = PlaneStrides {
            y_row_stride,
            uv_row_stride,
            uv_pixel_stride,
        };

        // SAFETY: forwarded from the caller's contract
        let frame = unsafe {
            FrameView::from_raw(y_ptr, y_size, u_ptr, v_ptr, uv_size, strides, timestamp_ns)
        };

        match frame {
            Ok(frame) => self.deliver(&frame),
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, timestamp_ns, "Rejected raw frame");
                false
            }
        }
    }

    /// Frames handed to the handler so far
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames rejected by validation so far
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
