// SPDX-License-Identifier: GPL-3.0-only

//! Wiring of the render thread, correlator, sessions and texture pool
//!
//! A [`RenderBridge`] owns one render thread running a
//! [`RenderEventDispatcher`] and hands out texture managers and converters
//! that share its queue, correlator and pool.

use crate::capture::SessionRegistry;
use crate::config::{Config, ConversionBackendKind, GpuSettings};
use crate::converter::YuvToRgbaConverter;
use crate::errors::{BridgeError, BridgeResult, ConvertError, TextureError};
use crate::gpu::{GpuDeviceInfo, create_compute_device};
use crate::native::{NativeOpCorrelator, RenderEventDispatcher, RenderQueue, RenderThread};
use crate::shaders::{ConversionBackend, CpuYuv420Processor, Yuv420Processor};
use crate::texture::{
    HeadlessRenderer, HeadlessTexturePool, TextureLifecycleManager, TexturePool, WgpuRenderer,
    WgpuTexturePool,
};
use crate::types::{NativeTextureId, Resolution, TextureFormat};
use image::RgbaImage;
use std::sync::Arc;
use tracing::{info, warn};

enum PoolBackend {
    Headless(Arc<HeadlessTexturePool>),
    Wgpu {
        pool: Arc<WgpuTexturePool>,
        info: GpuDeviceInfo,
    },
}

/// Render thread plus the shared state texture operations go through
pub struct RenderBridge {
    thread: RenderThread,
    correlator: Arc<NativeOpCorrelator>,
    sessions: Arc<SessionRegistry>,
    backend: PoolBackend,
    shut_down: bool,
}

impl RenderBridge {
    /// Bridge over CPU-memory textures with CPU conversion
    pub fn headless(thread_name: &str) -> BridgeResult<Self> {
        let pool = Arc::new(HeadlessTexturePool::new());
        let correlator = Arc::new(NativeOpCorrelator::new());
        let sessions = Arc::new(SessionRegistry::new());

        let dispatcher = RenderEventDispatcher::new(
            HeadlessRenderer::new(Arc::clone(&pool)),
            correlator.clone(),
            Arc::clone(&sessions),
        );
        let thread = RenderThread::start(thread_name, dispatcher)?;

        info!(thread = thread_name, "Headless render bridge started");
        Ok(Self {
            thread,
            correlator,
            sessions,
            backend: PoolBackend::Headless(pool),
            shut_down: false,
        })
    }

    /// Bridge over wgpu textures with GPU conversion on the same device
    pub async fn wgpu(thread_name: &str, settings: &GpuSettings) -> BridgeResult<Self> {
        let (device, queue, info) = create_compute_device("Camera Bridge", settings)
            .await
            .map_err(BridgeError::Gpu)?;

        let pool = Arc::new(WgpuTexturePool::new(device, queue));
        let correlator = Arc::new(NativeOpCorrelator::new());
        let sessions = Arc::new(SessionRegistry::new());

        let dispatcher = RenderEventDispatcher::new(
            WgpuRenderer::new(Arc::clone(&pool)),
            correlator.clone(),
            Arc::clone(&sessions),
        );
        let thread = RenderThread::start(thread_name, dispatcher)?;

        info!(
            thread = thread_name,
            adapter = %info.adapter_name,
            backend = ?info.backend,
            "GPU render bridge started"
        );
        Ok(Self {
            thread,
            correlator,
            sessions,
            backend: PoolBackend::Wgpu { pool, info },
            shut_down: false,
        })
    }

    /// Build the bridge `config` asks for.
    ///
    /// `Auto` tries the GPU first and falls back to headless without an adapter.
    pub async fn from_config(config: &Config) -> BridgeResult<Self> {
        let name = config.render_thread_name.as_str();
        match config.conversion {
            ConversionBackendKind::Cpu => Self::headless(name),
            ConversionBackendKind::Gpu => Self::wgpu(name, &config.gpu).await,
            ConversionBackendKind::Auto => match Self::wgpu(name, &config.gpu).await {
                Ok(bridge) => Ok(bridge),
                Err(e) => {
                    warn!(error = %e, "GPU unavailable, using headless backend");
                    Self::headless(name)
                }
            },
        }
    }

    /// New lifecycle manager for one texture on this bridge
    pub fn texture_manager(&self, format: TextureFormat) -> TextureLifecycleManager {
        TextureLifecycleManager::new(self.pool(), self.correlator.clone(), self.queue(), format)
    }

    /// New converter for frames of `resolution`, on the bridge's backend
    pub fn converter(&self, resolution: Resolution) -> BridgeResult<YuvToRgbaConverter> {
        let backend: Box<dyn ConversionBackend> = match &self.backend {
            PoolBackend::Headless(_) => Box::new(CpuYuv420Processor::new(resolution)),
            PoolBackend::Wgpu { pool, .. } => Box::new(
                Yuv420Processor::new(
                    Arc::clone(pool.device()),
                    Arc::clone(pool.queue()),
                    resolution,
                )
                .map_err(ConvertError::BackendUnavailable)?,
            ),
        };
        Ok(YuvToRgbaConverter::new(resolution, backend, self.queue()))
    }

    /// Read a texture's current pixels back to the CPU
    pub async fn read_texture(&self, id: NativeTextureId) -> BridgeResult<RgbaImage> {
        match &self.backend {
            PoolBackend::Headless(pool) => pool
                .pixels(id)
                .ok_or(BridgeError::Texture(TextureError::UnknownTexture(id))),
            PoolBackend::Wgpu { pool, .. } => Ok(pool.read_pixels(id).await?),
        }
    }

    pub fn queue(&self) -> RenderQueue {
        self.thread.queue()
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn correlator(&self) -> &Arc<NativeOpCorrelator> {
        &self.correlator
    }

    pub fn pool(&self) -> Arc<dyn TexturePool> {
        match &self.backend {
            PoolBackend::Headless(pool) => pool.clone(),
            PoolBackend::Wgpu { pool, .. } => pool.clone(),
        }
    }

    /// Adapter in use, if the bridge runs on the GPU
    pub fn gpu_info(&self) -> Option<&GpuDeviceInfo> {
        match &self.backend {
            PoolBackend::Headless(_) => None,
            PoolBackend::Wgpu { info, .. } => Some(info),
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.backend, PoolBackend::Wgpu { .. })
    }

    /// Stop the render thread and fail every operation still waiting on it.
    ///
    /// Jobs queued before the call still run. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.thread.stop();
        let abandoned = self.correlator.abandon_all();
        info!(thread = self.thread.name(), abandoned, "Render bridge shut down");
    }
}

impl Drop for RenderBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSession, CaptureTemplate};
    use crate::texture::TextureState;
    use crate::types::SourceId;

    struct AcceptingSession;

    impl CaptureSession for AcceptingSession {
        fn bind_surface(&mut self, _texture: NativeTextureId) -> bool {
            true
        }
        fn open(&mut self) -> bool {
            true
        }
        fn request_capture(&mut self, _template: CaptureTemplate) -> bool {
            true
        }
        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_headless_texture_round_trip() {
        let mut bridge = RenderBridge::headless("bridge-test").unwrap();
        assert!(!bridge.is_gpu());
        bridge
            .sessions()
            .register(42, Box::new(AcceptingSession))
            .unwrap();

        let manager = bridge.texture_manager(TextureFormat::Rgba8Unorm);
        let info = manager.create(Resolution::new(2, 2), 42).await.unwrap();
        assert_eq!(bridge.sessions().active_count(), 1);

        let source = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        bridge
            .pool()
            .register_source(
                SourceId(7),
                crate::shaders::RgbaSurface::Cpu(Arc::new(source)),
            )
            .unwrap();
        manager.update(SourceId(7)).await.unwrap();

        let pixels = bridge.read_texture(info.id).await.unwrap();
        assert!(pixels.pixels().all(|p| p.0 == [1, 2, 3, 255]));

        manager.destroy().await.unwrap();
        assert_eq!(manager.state(), TextureState::Destroyed);
        assert_eq!(bridge.sessions().active_count(), 0);

        bridge.shutdown();
        bridge.shutdown();
    }

    #[tokio::test]
    async fn test_create_without_session_fails() {
        let bridge = RenderBridge::headless("bridge-test-nosession").unwrap();
        let manager = bridge.texture_manager(TextureFormat::Rgba8Unorm);

        let result = manager.create(Resolution::new(2, 2), 1).await;
        assert!(matches!(
            result,
            Err(TextureError::NativeFailed {
                operation: "create",
                ..
            })
        ));
        assert_eq!(manager.state(), TextureState::Uninitialized);
    }

    #[tokio::test]
    async fn test_operations_after_shutdown_fail() {
        let mut bridge = RenderBridge::headless("bridge-test-shutdown").unwrap();
        let manager = bridge.texture_manager(TextureFormat::Rgba8Unorm);
        bridge.shutdown();

        let result = manager.create(Resolution::new(2, 2), 0).await;
        assert!(result.is_err());
        assert_eq!(manager.state(), TextureState::Uninitialized);
    }

    #[tokio::test]
    async fn test_unusable_conversion_size_reports_backend_unavailable() {
        // This test requires a GPU, so it may be skipped in CI
        let bridge = match RenderBridge::wgpu("bridge-test-gpu", &GpuSettings::default()).await {
            Ok(bridge) => bridge,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        assert!(matches!(
            bridge.converter(Resolution::new(0, 0)),
            Err(BridgeError::Convert(ConvertError::BackendUnavailable(_)))
        ));
    }
}
