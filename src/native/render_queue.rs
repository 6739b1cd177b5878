// SPDX-License-Identifier: GPL-3.0-only

//! Queue of work for the render thread
//!
//! Producers on any thread submit render commands or post closures. Whoever
//! owns the render thread drains the queue through a [`RenderPump`], either the
//! crate's own [`RenderThread`](super::RenderThread) or a host engine calling
//! [`RenderPump::pump`] once per frame.

use super::descriptor::RenderCommand;
use crate::errors::RenderError;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use tracing::trace;

/// Work executed on the render thread
pub enum RenderJob {
    /// A render event with its descriptor
    Event(RenderCommand),
    /// Arbitrary work that must run on the render thread
    Task(Box<dyn FnOnce() + Send>),
}

/// Handler for render events drained from the queue
pub trait RenderEventHandler: Send {
    fn on_render_event(&mut self, command: RenderCommand);
}

/// Sending half of the render queue
#[derive(Clone)]
pub struct RenderQueue {
    name: std::sync::Arc<str>,
    sender: Sender<RenderJob>,
}

impl RenderQueue {
    /// Submit a render event
    pub fn submit(&self, command: RenderCommand) -> Result<(), RenderError> {
        trace!(queue = %self.name, event = command.event_id, "Submitting render event");
        self.sender
            .send(RenderJob::Event(command))
            .map_err(|_| RenderError::QueueClosed)
    }

    /// Post a closure to run on the render thread
    pub fn post<F>(&self, task: F) -> Result<(), RenderError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(RenderJob::Task(Box::new(task)))
            .map_err(|_| RenderError::QueueClosed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of one blocking pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// At least one job ran
    Processed(usize),
    /// Nothing arrived before the timeout
    Idle,
    /// Every queue handle is gone and the queue is empty
    Disconnected,
}

/// Receiving half of the render queue; lives on the render thread
pub struct RenderPump {
    name: std::sync::Arc<str>,
    receiver: Receiver<RenderJob>,
}

impl RenderPump {
    /// Run every job already queued, without blocking. Returns the number run.
    pub fn pump(&mut self, handler: &mut dyn RenderEventHandler) -> usize {
        let mut processed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(job) => {
                    run_job(job, handler);
                    processed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        processed
    }

    /// Wait up to `timeout` for work, then drain whatever is queued
    pub fn pump_blocking(
        &mut self,
        handler: &mut dyn RenderEventHandler,
        timeout: Duration,
    ) -> PumpStatus {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                run_job(job, handler);
                PumpStatus::Processed(1 + self.pump(handler))
            }
            Err(RecvTimeoutError::Timeout) => PumpStatus::Idle,
            Err(RecvTimeoutError::Disconnected) => PumpStatus::Disconnected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn run_job(job: RenderJob, handler: &mut dyn RenderEventHandler) {
    match job {
        RenderJob::Event(command) => handler.on_render_event(command),
        RenderJob::Task(task) => task(),
    }
}

/// Create a connected queue and pump
pub fn render_channel(name: &str) -> (RenderQueue, RenderPump) {
    let (sender, receiver) = mpsc::channel();
    let name: std::sync::Arc<str> = name.into();
    (
        RenderQueue {
            name: name.clone(),
            sender,
        },
        RenderPump { name, receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Vec<u32>,
    }

    impl RenderEventHandler for Recorder {
        fn on_render_event(&mut self, command: RenderCommand) {
            self.events.push(command.event_id);
        }
    }

    fn command(event_id: u32) -> RenderCommand {
        RenderCommand {
            event_id,
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_pump_runs_in_order() {
        let (queue, mut pump) = render_channel("test");
        let mut recorder = Recorder::default();
        let ran = Arc::new(AtomicU32::new(0));

        queue.submit(command(1)).unwrap();
        let ran_clone = ran.clone();
        queue
            .post(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        queue.submit(command(3)).unwrap();

        assert_eq!(pump.pump(&mut recorder), 3);
        assert_eq!(recorder.events, vec![1, 3]);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pump.pump(&mut recorder), 0);
    }

    #[test]
    fn test_submit_after_pump_dropped() {
        let (queue, pump) = render_channel("test");
        drop(pump);
        assert_eq!(queue.submit(command(1)), Err(RenderError::QueueClosed));
        assert_eq!(queue.post(|| {}), Err(RenderError::QueueClosed));
    }

    #[test]
    fn test_pump_blocking_status() {
        let (queue, mut pump) = render_channel("test");
        let mut recorder = Recorder::default();

        assert_eq!(
            pump.pump_blocking(&mut recorder, Duration::from_millis(1)),
            PumpStatus::Idle
        );

        queue.submit(command(2)).unwrap();
        queue.submit(command(2)).unwrap();
        assert_eq!(
            pump.pump_blocking(&mut recorder, Duration::from_millis(1)),
            PumpStatus::Processed(2)
        );

        drop(queue);
        assert_eq!(
            pump.pump_blocking(&mut recorder, Duration::from_millis(1)),
            PumpStatus::Disconnected
        );
    }
}
