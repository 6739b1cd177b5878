// SPDX-License-Identifier: GPL-3.0-only

//! wgpu texture backend
//!
//! Textures live on the same device as the GPU conversion kernel, so a
//! converted frame reaches a managed texture with one texture-to-texture copy.

use super::backend::{NativeRenderer, TexturePool};
use crate::errors::TextureError;
use crate::gpu::wgpu;
use crate::native::SetupDescriptor;
use crate::shaders::read_texture_rgba;
use crate::shaders::yuv420_convert::RgbaSurface;
use crate::types::{NativeTextureId, Resolution, SourceId, TextureFormat};
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

struct WgpuTextureEntry {
    texture: Arc<wgpu::Texture>,
    attached: bool,
}

/// Pool of device textures and registered source surfaces
pub struct WgpuTexturePool {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: AtomicU32,
    textures: Mutex<HashMap<NativeTextureId, WgpuTextureEntry>>,
    sources: Mutex<HashMap<SourceId, RgbaSurface>>,
}

impl WgpuTexturePool {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_id: AtomicU32::new(1),
            textures: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Device texture behind `id`
    pub fn texture(&self, id: NativeTextureId) -> Option<Arc<wgpu::Texture>> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|e| Arc::clone(&e.texture))
    }

    pub fn is_attached(&self, id: NativeTextureId) -> bool {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|e| e.attached)
    }

    /// Read a texture's current pixels back to the CPU
    pub async fn read_pixels(&self, id: NativeTextureId) -> Result<RgbaImage, TextureError> {
        let texture = self.texture(id).ok_or(TextureError::UnknownTexture(id))?;
        read_texture_rgba(&self.device, &self.queue, &texture)
            .await
            .map_err(TextureError::AllocationFailed)
    }

    fn source(&self, source: SourceId) -> Option<RgbaSurface> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source)
            .cloned()
    }
}

impl TexturePool for WgpuTexturePool {
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

        let max = self.device.limits().max_texture_dimension_2d;
        if resolution.width > max || resolution.height > max {
            return Err(TextureError::AllocationFailed(format!(
                "{} exceeds the device limit of {}",
                resolution, max
            )));
        }

        let id = NativeTextureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Managed Camera Texture"),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(format),
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                WgpuTextureEntry {
                    texture: Arc::new(texture),
                    attached: false,
                },
            );
        debug!(texture = %id, resolution = %resolution, ?format, "Allocated device texture");
        Ok(id)
    }

    fn release(&self, id: NativeTextureId) {
        let entry = self
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(entry) = entry {
            entry.texture.destroy();
            debug!(texture = %id, "Released device texture");
        }
    }

    fn contains(&self, id: NativeTextureId) -> bool {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn register_source(&self, source: SourceId, surface: RgbaSurface) -> Result<(), TextureError> {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if sources.contains_key(&source) {
            return Err(TextureError::SourceAlreadyRegistered(source));
        }
        sources.insert(source, surface);
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

/// Render-thread half of the wgpu backend
pub struct WgpuRenderer {
    pool: Arc<WgpuTexturePool>,
}

impl WgpuRenderer {
    pub fn new(pool: Arc<WgpuTexturePool>) -> Self {
        Self { pool }
    }

    fn attached_texture(&self, id: NativeTextureId) -> Result<Arc<wgpu::Texture>, String> {
        self.pool
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .filter(|e| e.attached)
            .map(|e| Arc::clone(&e.texture))
            .ok_or_else(|| format!("texture {} is not set up", id))
    }
}

impl NativeRenderer for WgpuRenderer {
    fn setup(&mut self, descriptor: &SetupDescriptor) -> Result<(), String> {
        let id = descriptor.texture_id();
        let mut textures = self
            .pool
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = textures
            .get_mut(&id)
            .ok_or_else(|| format!("texture {} was not allocated", id))?;

        let size = (entry.texture.width(), entry.texture.height());
        if size != (descriptor.width, descriptor.height) {
            return Err(format!(
                "texture {} is {}x{}, setup asked for {}x{}",
                id, size.0, size.1, descriptor.width, descriptor.height
            ));
        }

        entry.attached = true;
        Ok(())
    }

    fn update(&mut self, texture: NativeTextureId, source: SourceId) -> Result<(), String> {
        let surface = self
            .pool
            .source(source)
            .ok_or_else(|| format!("source {} is not registered", source))?;
        let target = self.attached_texture(texture)?;

        let src_size = surface.resolution();
        let extent = wgpu::Extent3d {
            width: target.width().min(src_size.width),
            height: target.height().min(src_size.height),
            depth_or_array_layers: 1,
        };
        let destination = wgpu::TexelCopyTextureInfo {
            texture: &*target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        };

        match surface {
            RgbaSurface::Gpu(src) => {
                let mut encoder =
                    self.pool
                        .device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("Texture Update Encoder"),
                        });
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &*src,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    destination,
                    extent,
                );
                self.pool.queue.submit(std::iter::once(encoder.finish()));
            }
            RgbaSurface::Cpu(image) => {
                self.pool.queue.write_texture(
                    destination,
                    image.as_raw(),
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(image.width() * 4),
                        rows_per_image: Some(image.height()),
                    },
                    extent,
                );
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
            Some(entry) => {
                entry.attached = false;
                Ok(())
            }
            None => Err(format!("texture {} was not allocated", texture)),
        }
    }
}
