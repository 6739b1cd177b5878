// SPDX-License-Identifier: GPL-3.0-only

//! YUV 4:2:0 to RGBA processors
//!
//! [`Yuv420Processor`] runs the WGSL kernel on a wgpu device; the destination
//! texture, the three plane buffers and the bind group are created once for
//! the processor's fixed resolution. [`CpuYuv420Processor`] runs the
//! reference kernel and is used when no GPU adapter is available.

use super::KERNEL_SOURCE;
use super::kernel::{ConvertParams, convert_yuv420_to_rgba};
use crate::capture::{StagingFrame, StagingLayout};
use crate::constants::kernel;
use crate::errors::ConvertError;
use crate::gpu::{self, wgpu};
use crate::shaders::{compute_dispatch_size, read_texture_rgba};
use crate::types::Resolution;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Converted frame, wherever it lives
#[derive(Debug, Clone)]
pub enum RgbaSurface {
    /// RGBA8 texture written by the GPU kernel
    Gpu(Arc<wgpu::Texture>),
    /// Image produced by the CPU kernel
    Cpu(Arc<RgbaImage>),
}

impl RgbaSurface {
    pub fn resolution(&self) -> Resolution {
        match self {
            RgbaSurface::Gpu(texture) => Resolution::new(texture.width(), texture.height()),
            RgbaSurface::Cpu(image) => Resolution::new(image.width(), image.height()),
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, RgbaSurface::Gpu(_))
    }
}

/// Two-step conversion: upload a staging frame, then run the kernel.
///
/// Both steps run on the render thread. The caller disposes the staging frame
/// between them.
pub trait ConversionBackend: Send {
    fn name(&self) -> &'static str;

    /// Copy the staging planes and parameters into backend-owned buffers
    fn upload(&mut self, staging: &StagingFrame, params: &ConvertParams)
    -> Result<(), ConvertError>;

    /// Convert the last upload into the destination surface
    fn dispatch(&mut self) -> Result<RgbaSurface, ConvertError>;

    /// Release every backend resource. Idempotent.
    fn release(&mut self);
}

struct GpuResources {
    y_buffer: wgpu::Buffer,
    u_buffer: wgpu::Buffer,
    v_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    output_texture: Arc<wgpu::Texture>,
    bind_group: wgpu::BindGroup,
}

/// GPU processor for YUV 4:2:0 to RGBA conversion
pub struct Yuv420Processor {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    resolution: Resolution,
    layout: StagingLayout,
    resources: Option<GpuResources>,
}

impl Yuv420Processor {
    /// Create a processor on its own compute device
    pub async fn create(
        resolution: Resolution,
        settings: &crate::config::GpuSettings,
    ) -> Result<Self, String> {
        let (device, queue, info) = gpu::create_compute_device("YUV420 Convert", settings).await?;

        info!(
            adapter_name = %info.adapter_name,
            fallback = info.is_fallback,
            "GPU device created for YUV conversion"
        );

        Self::new(device, queue, resolution)
    }

    /// Create a processor on an existing device
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        resolution: Resolution,
    ) -> Result<Self, String> {
        if !resolution.is_valid() {
            return Err(format!("Invalid conversion size {}", resolution));
        }

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("YUV420 to RGBA Shader"),
            source: wgpu::ShaderSource::Wgsl(KERNEL_SOURCE.into()),
        });

        let plane_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("YUV420 Convert Bind Group Layout"),
            entries: &[
                plane_entry(kernel::BINDING_Y_PLANE),
                plane_entry(kernel::BINDING_U_PLANE),
                plane_entry(kernel::BINDING_V_PLANE),
                // Params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: kernel::BINDING_PARAMS,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Output RGBA texture
                wgpu::BindGroupLayoutEntry {
                    binding: kernel::BINDING_OUTPUT,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("YUV420 Convert Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("YUV420 to RGBA Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some(kernel::ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        let layout = StagingLayout::for_resolution(resolution);
        let resources = Self::allocate(&device, &bind_group_layout, resolution, layout);

        debug!(
            resolution = %resolution,
            y_capacity = layout.y_capacity,
            uv_capacity = layout.uv_capacity,
            "Allocated YUV420 convert resources"
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            resolution,
            layout,
            resources: Some(resources),
        })
    }

    fn allocate(
        device: &wgpu::Device,
        bind_group_layout: &wgpu::BindGroupLayout,
        resolution: Resolution,
        layout: StagingLayout,
    ) -> GpuResources {
        let plane_buffer = |label: &str, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let y_buffer = plane_buffer("Y Plane Buffer", layout.y_capacity);
        let u_buffer = plane_buffer("U Plane Buffer", layout.uv_capacity);
        let v_buffer = plane_buffer("V Plane Buffer", layout.uv_capacity);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("YUV420 Params Buffer"),
            size: std::mem::size_of::<ConvertParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let output_texture = Arc::new(device.create_texture(&wgpu::TextureDescriptor {
            label: Some("YUV420 RGBA Output Texture"),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        }));

        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("YUV420 Convert Bind Group"),
            layout: bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: kernel::BINDING_Y_PLANE,
                    resource: y_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::BINDING_U_PLANE,
                    resource: u_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::BINDING_V_PLANE,
                    resource: v_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::BINDING_PARAMS,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::BINDING_OUTPUT,
                    resource: wgpu::BindingResource::TextureView(&output_view),
                },
            ],
        });

        GpuResources {
            y_buffer,
            u_buffer,
            v_buffer,
            uniform_buffer,
            output_texture,
            bind_group,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Get the GPU device for sharing with other GPU operations
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the GPU queue for sharing with other GPU operations
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Get the destination texture, until released
    pub fn output_texture(&self) -> Option<&Arc<wgpu::Texture>> {
        self.resources.as_ref().map(|r| &r.output_texture)
    }

    /// Read the destination texture back to the CPU
    pub async fn read_back(&self) -> Result<RgbaImage, String> {
        let texture = self
            .output_texture()
            .ok_or_else(|| "Processor resources were released".to_string())?;
        read_texture_rgba(&self.device, &self.queue, texture).await
    }
}

impl ConversionBackend for Yuv420Processor {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn upload(
        &mut self,
        staging: &StagingFrame,
        params: &ConvertParams,
    ) -> Result<(), ConvertError> {
        let resources = self.resources.as_ref().ok_or(ConvertError::Disposed)?;

        if staging.layout() != self.layout {
            return Err(ConvertError::UploadFailed(format!(
                "staging layout {:?} does not match {:?}",
                staging.layout(),
                self.layout
            )));
        }

        // Full-capacity planes keep every write a multiple of 4 bytes
        staging
            .with_planes(|y, u, v| {
                self.queue.write_buffer(&resources.y_buffer, 0, y);
                self.queue.write_buffer(&resources.u_buffer, 0, u);
                self.queue.write_buffer(&resources.v_buffer, 0, v);
            })
            .ok_or_else(|| ConvertError::UploadFailed("staging frame already disposed".into()))?;

        self.queue
            .write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(params));
        Ok(())
    }

    fn dispatch(&mut self) -> Result<RgbaSurface, ConvertError> {
        let resources = self.resources.as_ref().ok_or(ConvertError::Disposed)?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("YUV420 Convert Encoder"),
            });

        let workgroups_x = compute_dispatch_size(self.resolution.width, kernel::WORKGROUP_SIZE);
        let workgroups_y = compute_dispatch_size(self.resolution.height, kernel::WORKGROUP_SIZE);

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("YUV420 to RGBA Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &resources.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ConvertError::DispatchFailed(format!("{:?}", e)))?;

        Ok(RgbaSurface::Gpu(Arc::clone(&resources.output_texture)))
    }

    fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.y_buffer.destroy();
            resources.u_buffer.destroy();
            resources.v_buffer.destroy();
            resources.uniform_buffer.destroy();
            resources.output_texture.destroy();
            debug!(resolution = %self.resolution, "Released YUV420 convert resources");
        }
    }
}

struct PendingUpload {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    params: ConvertParams,
}

/// CPU processor running the reference kernel
pub struct CpuYuv420Processor {
    resolution: Resolution,
    layout: StagingLayout,
    pending: Option<PendingUpload>,
    released: bool,
}

impl CpuYuv420Processor {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            layout: StagingLayout::for_resolution(resolution),
            pending: None,
            released: false,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

impl ConversionBackend for CpuYuv420Processor {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn upload(
        &mut self,
        staging: &StagingFrame,
        params: &ConvertParams,
    ) -> Result<(), ConvertError> {
        if self.released {
            return Err(ConvertError::Disposed);
        }
        if staging.layout() != self.layout {
            return Err(ConvertError::UploadFailed(format!(
                "staging layout {:?} does not match {:?}",
                staging.layout(),
                self.layout
            )));
        }

        let (y, u, v) = staging
            .with_planes(|y, u, v| (y.to_vec(), u.to_vec(), v.to_vec()))
            .ok_or_else(|| ConvertError::UploadFailed("staging frame already disposed".into()))?;

        self.pending = Some(PendingUpload {
            y,
            u,
            v,
            params: *params,
        });
        Ok(())
    }

    fn dispatch(&mut self) -> Result<RgbaSurface, ConvertError> {
        if self.released {
            return Err(ConvertError::Disposed);
        }
        let upload = self
            .pending
            .take()
            .ok_or_else(|| ConvertError::DispatchFailed("nothing uploaded".into()))?;

        let image = convert_yuv420_to_rgba(&upload.y, &upload.u, &upload.v, &upload.params);
        Ok(RgbaSurface::Cpu(Arc::new(image)))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.pending = None;
            debug!(resolution = %self.resolution, "Released CPU converter buffers");
        }
    }
}

impl Drop for Yuv420Processor {
    fn drop(&mut self) {
        if self.resources.is_some() {
            warn!(resolution = %self.resolution, "Yuv420Processor dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameView, PlaneStrides};
    use crate::config::GpuSettings;

    fn staged_frame(resolution: Resolution, y: u8, u: u8, v: u8) -> StagingFrame {
        let staging = StagingFrame::new(StagingLayout::for_resolution(resolution));
        let y_plane = vec![y; resolution.pixel_count()];
        let uv_plane = vec![u; resolution.pixel_count().div_ceil(4)];
        let v_plane = vec![v; resolution.pixel_count().div_ceil(4)];
        staging.fill_from(&FrameView::new(
            &y_plane,
            &uv_plane,
            &v_plane,
            PlaneStrides::planar(resolution.width),
            0,
        ));
        staging
    }

    #[test]
    fn test_cpu_processor_converts_after_staging_disposed() {
        let resolution = Resolution::new(8, 6);
        let mut processor = CpuYuv420Processor::new(resolution);
        let staging = staged_frame(resolution, 235, 128, 128);
        let params = ConvertParams::new(resolution, PlaneStrides::planar(resolution.width));

        processor.upload(&staging, &params).unwrap();
        staging.dispose();

        let RgbaSurface::Cpu(image) = processor.dispatch().unwrap() else {
            panic!("CPU processor produced a GPU surface");
        };
        assert_eq!(image.dimensions(), (8, 6));
        assert!(image.pixels().all(|p| p.0 == [251, 251, 251, 255]));
    }

    #[test]
    fn test_cpu_processor_rejects_after_release() {
        let resolution = Resolution::new(4, 4);
        let mut processor = CpuYuv420Processor::new(resolution);
        processor.release();
        processor.release();
        let staging = staged_frame(resolution, 0, 0, 0);
        let params = ConvertParams::new(resolution, PlaneStrides::planar(4));
        assert_eq!(
            processor.upload(&staging, &params),
            Err(ConvertError::Disposed)
        );
        assert!(matches!(processor.dispatch(), Err(ConvertError::Disposed)));
    }

    #[test]
    fn test_cpu_processor_rejects_mismatched_layout() {
        let mut processor = CpuYuv420Processor::new(Resolution::new(4, 4));
        let staging = staged_frame(Resolution::new(8, 8), 0, 0, 0);
        let params = ConvertParams::new(Resolution::new(4, 4), PlaneStrides::planar(4));
        assert!(matches!(
            processor.upload(&staging, &params),
            Err(ConvertError::UploadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_gpu_matches_reference_kernel() {
        // This test requires a GPU, so it may be skipped in CI
        let resolution = Resolution::new(13, 9);
        let mut processor = match Yuv420Processor::create(resolution, &GpuSettings::default()).await
        {
            Ok(processor) => processor,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let staging = StagingFrame::new(StagingLayout::for_resolution(resolution));
        let y: Vec<u8> = (0..resolution.pixel_count()).map(|i| (i * 7 % 256) as u8).collect();
        let u: Vec<u8> = (0..35).map(|i| (i * 11 % 256) as u8).collect();
        let v: Vec<u8> = (0..35).map(|i| (255 - i * 5 % 256) as u8).collect();
        let strides = PlaneStrides::planar(resolution.width);
        staging.fill_from(&FrameView::new(&y, &u, &v, strides, 0));
        let params = ConvertParams::new(resolution, strides);

        processor.upload(&staging, &params).unwrap();
        let expected = staging
            .with_planes(|y, u, v| convert_yuv420_to_rgba(y, u, v, &params))
            .unwrap();
        staging.dispose();
        processor.dispatch().unwrap();

        let actual = processor.read_back().await.unwrap();
        for (a, e) in actual.pixels().zip(expected.pixels()) {
            for channel in 0..4 {
                assert!(
                    (a.0[channel] as i16 - e.0[channel] as i16).abs() <= 1,
                    "GPU {:?} vs reference {:?}",
                    a,
                    e
                );
            }
        }
        processor.release();
    }
}
