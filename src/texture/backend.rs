// SPDX-License-Identifier: GPL-3.0-only

//! Seams between the lifecycle manager and a concrete texture backend
//!
//! A backend has two halves. The [`TexturePool`] allocates and releases host
//! memory for textures and holds the registered source surfaces; it is shared
//! and may be called from any thread. The [`NativeRenderer`] attaches,
//! updates and detaches textures and lives on the render thread.

use crate::errors::TextureError;
use crate::native::SetupDescriptor;
use crate::shaders::yuv420_convert::RgbaSurface;
use crate::types::{NativeTextureId, Resolution, SourceId, TextureFormat};

/// Host-side texture allocation and source surface registry
pub trait TexturePool: Send + Sync {
    /// Allocate a texture and return its native id
    fn allocate(
        &self,
        resolution: Resolution,
        format: TextureFormat,
    ) -> Result<NativeTextureId, TextureError>;

    /// Free a texture. Unknown ids are ignored.
    fn release(&self, id: NativeTextureId);

    fn contains(&self, id: NativeTextureId) -> bool;

    /// Make `surface` available to texture updates under `source`
    fn register_source(&self, source: SourceId, surface: RgbaSurface)
    -> Result<(), TextureError>;

    /// Remove a source surface. Returns false if it was not registered.
    fn deregister_source(&self, source: SourceId) -> bool;

    fn has_source(&self, source: SourceId) -> bool;
}

/// Render-thread half of a texture backend
pub trait NativeRenderer: Send {
    /// Attach a freshly allocated texture
    fn setup(&mut self, descriptor: &SetupDescriptor) -> Result<(), String>;

    /// Copy a registered source surface into `texture`
    fn update(&mut self, texture: NativeTextureId, source: SourceId) -> Result<(), String>;

    /// Detach `texture` and drop its native resources
    fn teardown(&mut self, texture: NativeTextureId) -> Result<(), String>;
}
