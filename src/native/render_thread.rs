// SPDX-License-Identifier: GPL-3.0-only

//! Crate-owned render thread
//!
//! Hosts without their own render loop run the render side here. The thread
//! owns the [`RenderPump`] and the event handler, blocks on the queue with a
//! short timeout and re-checks its stop signal between waits.

use super::render_queue::{PumpStatus, RenderEventHandler, RenderQueue, render_channel};
use crate::constants::RENDER_THREAD_POLL_INTERVAL;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Controller for the render thread
///
/// # Example
///
/// ```ignore
/// let mut thread = RenderThread::start("render", dispatcher)?;
/// let queue = thread.queue();
/// queue.submit(RenderCommand::setup(descriptor))?;
///
/// // Later
/// thread.stop();
/// ```
pub struct RenderThread {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    queue: RenderQueue,
    name: String,
}

impl RenderThread {
    /// Spawn the render thread with an already-built handler
    pub fn start<H>(name: &str, handler: H) -> std::io::Result<Self>
    where
        H: RenderEventHandler + 'static,
    {
        Self::start_with_init(name, move || Ok(handler))
    }

    /// Spawn the render thread and build its handler on it.
    ///
    /// Use this when the handler owns thread-affine resources. If `init_fn`
    /// fails the thread exits immediately and queued jobs are dropped.
    pub fn start_with_init<H, I>(name: &str, init_fn: I) -> std::io::Result<Self>
    where
        H: RenderEventHandler + 'static,
        I: FnOnce() -> Result<H, String> + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let (queue, mut pump) = render_channel(name);
        let name_clone = name.to_string();

        info!(name = %name, "Starting render thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Render thread started, initializing...");

                let mut handler = match init_fn() {
                    Ok(handler) => handler,
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Render thread initialization failed");
                        return;
                    }
                };

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    if pump.pump_blocking(&mut handler, RENDER_THREAD_POLL_INTERVAL)
                        == PumpStatus::Disconnected
                    {
                        debug!(name = %name_clone, "Render queue disconnected");
                        break;
                    }
                }

                // Run what was queued before the stop so pending completions fire
                let flushed = pump.pump(&mut handler);
                if flushed > 0 {
                    debug!(name = %name_clone, flushed, "Flushed queued render jobs");
                }

                info!(name = %name_clone, "Render thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            queue,
            name: name.to_string(),
        })
    }

    /// Handle for submitting work to this thread
    pub fn queue(&self) -> RenderQueue {
        self.queue.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the thread to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting render thread stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for render thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Render thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Render thread finished");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "RenderThread dropped, stopping");
            self.stop();
        }
    }
}
