// SPDX-License-Identifier: GPL-3.0-only

//! Natively-backed texture lifecycle
//!
//! [`TextureLifecycleManager`] owns one texture on the managed side. The
//! pixels live behind a [`TexturePool`]; the render thread drives a
//! [`NativeRenderer`] that sets textures up, copies source surfaces into
//! them and tears them down.
//!
//! Two backends are provided: a wgpu one sharing the conversion device, and
//! a headless one backed by CPU images.

pub mod backend;
pub mod headless;
pub mod manager;
pub mod state;
pub mod wgpu_backend;

pub use backend::{NativeRenderer, TexturePool};
pub use headless::{HeadlessRenderer, HeadlessTexturePool};
pub use manager::TextureLifecycleManager;
pub use state::{TextureInfo, TextureState};
pub use wgpu_backend::{WgpuRenderer, WgpuTexturePool};
