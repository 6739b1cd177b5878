// SPDX-License-Identifier: MPL-2.0

//! Camera Bridge - live camera frames into GPU textures
//!
//! This library moves frames from a camera capture backend into textures
//! owned by a rendering engine: YUV 4:2:0 frames are converted to RGBA on the
//! GPU, and natively-backed textures are created, updated and destroyed
//! through a render thread whose completions are matched back to the caller.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`capture`]: Frame ingestion, staging copies and capture sessions
//! - [`converter`]: YUV to RGBA converter and frame-processed notifications
//! - [`native`]: Render queue, render thread, descriptors and the completion correlator
//! - [`texture`]: Texture lifecycle manager and texture backends
//! - [`shaders`]: Conversion kernel and GPU helpers
//! - [`bridge`]: Ready-made wiring of all of the above
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let bridge = RenderBridge::headless("render")?;
//! let converter = bridge.converter(Resolution::new(1280, 720))?;
//! let channel = FrameChannel::with_handler(Arc::new(converter));
//! ```

pub mod bridge;
pub mod capture;
pub mod config;
pub mod constants;
pub mod converter;
pub mod errors;
pub mod gpu;
pub mod native;
pub mod shaders;
pub mod texture;
pub mod types;

// Re-export commonly used types
pub use bridge::RenderBridge;
pub use capture::{FrameChannel, FrameHandler, FrameView, PlaneStrides, StagingFrame};
pub use config::Config;
pub use converter::{FrameProcessed, YuvToRgbaConverter};
pub use errors::{BridgeError, BridgeResult};
pub use native::{NativeOpCorrelator, OpCorrelator};
pub use texture::{TextureLifecycleManager, TextureState};
pub use types::{NativeTextureId, OpStatus, Resolution, SourceId, TextureFormat};
