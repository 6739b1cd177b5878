// SPDX-License-Identifier: GPL-3.0-only

//! CPU-memory texture backend
//!
//! Textures are plain `RgbaImage`s. Used where no GPU is present: in tests,
//! in CI and by the CLI's CPU path.

use super::backend::{NativeRenderer, TexturePool};
use crate::errors::TextureError;
use crate::native::SetupDescriptor;
use crate::shaders::yuv420_convert::RgbaSurface;
use crate::types::{NativeTextureId, Resolution, SourceId, TextureFormat};
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

struct HeadlessTexture {
    image: RgbaImage,
    format: TextureFormat,
    attached: bool,
}

/// Pool of CPU-memory textures and source images
pub struct HeadlessTexturePool {
    next_id: AtomicU32,
    textures: Mutex<HashMap<NativeTextureId, HeadlessTexture>>,
    sources: Mutex<HashMap<SourceId, Arc<RgbaImage>>>,
}

impl Default for HeadlessTexturePool {
    fn default() -> Self {
        Self {
            // Zero is reserved for the invalid id
            next_id: AtomicU32::new(1),
            textures: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
        }
    }
}

impl HeadlessTexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a texture's current pixels
    pub fn pixels(&self, id: NativeTextureId) -> Option<RgbaImage> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|t| t.image.clone())
    }

    pub fn format(&self, id: NativeTextureId) -> Option<TextureFormat> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|t| t.format)
    }

    /// Whether the renderer has set the texture up and not yet torn it down
    pub fn is_attached(&self, id: NativeTextureId) -> bool {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|t| t.attached)
    }

    pub fn texture_count(&self) -> usize {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn source(&self, source: SourceId) -> Option<Arc<RgbaImage>> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source)
            .cloned()
    }
}

impl TexturePool for HeadlessTexturePool {
    fn allocate(
        &self,
        resolution: Resolution,
        format: TextureFormat,
    ) -> Result<NativeTextureId, TextureError> {
        if !resolution.is_valid() {
            return Err(TextureError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }

        let id = NativeTextureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                HeadlessTexture {
                    image: RgbaImage::new(resolution.width, resolution.height),
                    format,
                    attached: false,
                },
            );
        debug!(texture = %id, resolution = %resolution, "Allocated headless texture");
        Ok(id)
    }

    fn release(&self, id: NativeTextureId) {
        if self
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
        {
            debug!(texture = %id, "Released headless texture");
        }
    }

    fn contains(&self, id: NativeTextureId) -> bool {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn register_source(&self, source: SourceId, surface: RgbaSurface) -> Result<(), TextureError> {
        let RgbaSurface::Cpu(image) = surface else {
            return Err(TextureError::IncompatibleSource(source));
        };

        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if sources.contains_key(&source) {
            return Err(TextureError::SourceAlreadyRegistered(source));
        }
        sources.insert(source, image);
        Ok(())
    }

    fn deregister_source(&self, source: SourceId) -> bool {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&source)
            .is_some()
    }

    fn has_source(&self, source: SourceId) -> bool {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&source)
    }
}

/// Render-thread half of the headless backend
pub struct HeadlessRenderer {
    pool: Arc<HeadlessTexturePool>,
}

impl HeadlessRenderer {
    pub fn new(pool: Arc<HeadlessTexturePool>) -> Self {
        Self { pool }
    }
}

impl NativeRenderer for HeadlessRenderer {
    fn setup(&mut self, descriptor: &SetupDescriptor) -> Result<(), String> {
        let id = descriptor.texture_id();
        let mut textures = self
            .pool
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let texture = textures
            .get_mut(&id)
            .ok_or_else(|| format!("texture {} was not allocated", id))?;

        if texture.image.dimensions() != (descriptor.width, descriptor.height) {
            return Err(format!(
                "texture {} is {}x{}, setup asked for {}x{}",
                id,
                texture.image.width(),
                texture.image.height(),
                descriptor.width,
                descriptor.height
            ));
        }

        texture.attached = true;
        Ok(())
    }

    fn update(&mut self, texture: NativeTextureId, source: SourceId) -> Result<(), String> {
        let image = self
            .pool
            .source(source)
            .ok_or_else(|| format!("source {} is not registered", source))?;

        let mut textures = self
            .pool
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let target = textures
            .get_mut(&texture)
            .filter(|t| t.attached)
            .ok_or_else(|| format!("texture {} is not set up", texture))?;

        // Copy the overlapping region
        let width = target.image.width().min(image.width());
        let height = target.image.height().min(image.height());
        for y in 0..height {
            for x in 0..width {
                target.image.put_pixel(x, y, *image.get_pixel(x, y));
            }
        }
        Ok(())
    }

    fn teardown(&mut self, texture: NativeTextureId) -> Result<(), String> {
        let mut textures = self
            .pool
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match textures.get_mut(&texture) {
            Some(t) => {
                t.attached = false;
                Ok(())
            }
            None => Err(format!("texture {} was not allocated", texture)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_descriptor(id: NativeTextureId, width: u32, height: u32) -> SetupDescriptor {
        SetupDescriptor::new(
            id,
            Resolution::new(width, height),
            TextureFormat::Rgba8Unorm,
            0,
            0,
        )
    }

    #[test]
    fn test_ids_are_unique_and_nonzero() {
        let pool = HeadlessTexturePool::new();
        let a = pool
            .allocate(Resolution::new(2, 2), TextureFormat::Rgba8Unorm)
            .unwrap();
        let b = pool
            .allocate(Resolution::new(2, 2), TextureFormat::Rgba8UnormSrgb)
            .unwrap();
        assert!(a.is_valid() && b.is_valid());
        assert_ne!(a, b);
        assert_eq!(pool.format(b), Some(TextureFormat::Rgba8UnormSrgb));

        pool.release(a);
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
    }

    #[test]
    fn test_zero_size_rejected() {
        let pool = HeadlessTexturePool::new();
        assert_eq!(
            pool.allocate(Resolution::new(0, 4), TextureFormat::Rgba8Unorm),
            Err(TextureError::InvalidResolution {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn test_update_copies_source() {
        let pool = Arc::new(HeadlessTexturePool::new());
        let mut renderer = HeadlessRenderer::new(pool.clone());
        let id = pool
            .allocate(Resolution::new(2, 2), TextureFormat::Rgba8Unorm)
            .unwrap();

        let source = RgbaImage::from_pixel(3, 3, image::Rgba([9, 8, 7, 255]));
        pool.register_source(SourceId(1), RgbaSurface::Cpu(Arc::new(source)))
            .unwrap();

        // Not set up yet
        assert!(renderer.update(id, SourceId(1)).is_err());

        renderer.setup(&setup_descriptor(id, 2, 2)).unwrap();
        assert!(pool.is_attached(id));
        renderer.update(id, SourceId(1)).unwrap();
        assert!(
            pool.pixels(id)
                .unwrap()
                .pixels()
                .all(|p| p.0 == [9, 8, 7, 255])
        );

        renderer.teardown(id).unwrap();
        assert!(!pool.is_attached(id));
    }

    #[test]
    fn test_setup_size_mismatch_fails() {
        let pool = Arc::new(HeadlessTexturePool::new());
        let mut renderer = HeadlessRenderer::new(pool.clone());
        let id = pool
            .allocate(Resolution::new(2, 2), TextureFormat::Rgba8Unorm)
            .unwrap();
        assert!(renderer.setup(&setup_descriptor(id, 4, 4)).is_err());
        assert!(renderer.setup(&setup_descriptor(NativeTextureId(99), 2, 2)).is_err());
    }

    #[test]
    fn test_source_registration() {
        let pool = HeadlessTexturePool::new();
        let surface = RgbaSurface::Cpu(Arc::new(RgbaImage::new(1, 1)));
        pool.register_source(SourceId(5), surface.clone()).unwrap();
        assert_eq!(
            pool.register_source(SourceId(5), surface),
            Err(TextureError::SourceAlreadyRegistered(SourceId(5)))
        );
        assert!(pool.deregister_source(SourceId(5)));
        assert!(!pool.deregister_source(SourceId(5)));
    }
}
