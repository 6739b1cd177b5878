// SPDX-License-Identifier: GPL-3.0-only

//! Capture-side ingestion
//!
//! The capture backend delivers raw plane pointers that are only valid for
//! the duration of its callback. Everything in this module either borrows
//! them for that window ([`FrameView`]) or copies them out ([`StagingFrame`]).
//!
//! ```text
//! capture callback ──► FrameChannel ──► FrameHandler (copies) ──► StagingFrame
//! ```

pub mod frame;
pub mod frame_channel;
pub mod session;
pub mod staging;

pub use frame::{FrameView, PlaneStrides};
pub use frame_channel::{FrameChannel, FrameHandler};
pub use session::{CaptureSession, CaptureTemplate, SessionRegistry};
pub use staging::{Plane, StagingFrame, StagingLayout};
