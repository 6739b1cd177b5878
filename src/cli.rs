// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the camera bridge
//!
//! This module provides command-line functionality for:
//! - Running synthetic frames through conversion and texture updates
//! - Probing the GPU adapter

use camera_bridge::RenderBridge;
use camera_bridge::capture::{
    CaptureSession, CaptureTemplate, FrameChannel, FrameView, PlaneStrides,
};
use camera_bridge::config::{Config, GpuSettings};
use camera_bridge::constants::{self, kernel};
use camera_bridge::converter::FrameProcessed;
use camera_bridge::gpu::create_compute_device;
use camera_bridge::shaders::compute_dispatch_size;
use camera_bridge::types::{NativeTextureId, Resolution, SourceId};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long to wait for any single native operation or converted frame
const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture session standing in for a camera device
struct SyntheticSession {
    texture: Option<NativeTextureId>,
}

impl CaptureSession for SyntheticSession {
    fn bind_surface(&mut self, texture: NativeTextureId) -> bool {
        self.texture = Some(texture);
        true
    }

    fn open(&mut self) -> bool {
        debug!(texture = ?self.texture, "Synthetic session opened");
        true
    }

    fn request_capture(&mut self, template: CaptureTemplate) -> bool {
        debug!(%template, "Synthetic capture requested");
        true
    }

    fn close(&mut self) {
        debug!(texture = ?self.texture, "Synthetic session closed");
    }
}

/// Planar I420 test pattern: luma ramps across, chroma shifts per frame
struct SyntheticFrame {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    strides: PlaneStrides,
}

impl SyntheticFrame {
    fn new(resolution: Resolution, index: u32) -> Self {
        let strides = PlaneStrides::planar(resolution.width);
        let chroma_width = resolution.width.div_ceil(2);
        let chroma_height = resolution.height.div_ceil(2);

        let y = (0..resolution.height)
            .flat_map(|row| {
                (0..resolution.width)
                    .map(move |x| ((x * 219) / resolution.width.max(1) + row % 2) as u8)
            })
            .collect();

        let shift = (index * 32) as u8;
        let u = (0..chroma_height)
            .flat_map(|row| {
                (0..chroma_width).map(move |_| ((row * 255) / chroma_height.max(1)) as u8)
            })
            .map(|value| value.wrapping_add(shift))
            .collect();
        let v = (0..chroma_height * chroma_width)
            .map(|i| ((i % chroma_width) * 255 / chroma_width.max(1)) as u8)
            .collect();

        Self { y, u, v, strides }
    }

    fn view(&self, timestamp_ns: i64) -> FrameView<'_> {
        FrameView::new(&self.y, &self.u, &self.v, self.strides, timestamp_ns)
    }
}

/// Push `frames` synthetic frames through conversion and texture updates,
/// then save the texture contents as a PNG
pub fn convert(
    config: Config,
    frames: u32,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let output_path = match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(format!("frame_{}.png", timestamp))
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_pipeline(config, frames.max(1), output_path))
}

async fn run_pipeline(
    config: Config,
    frames: u32,
    output_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolution = config.resolution;
    let mut bridge = RenderBridge::from_config(&config).await?;
    match bridge.gpu_info() {
        Some(gpu) => println!("Using GPU: {} ({:?})", gpu.adapter_name, gpu.backend),
        None => println!("Using CPU conversion"),
    }
    println!("Resolution: {}", resolution);

    // The capture session is queued under the timestamp the texture is created with
    let session_timestamp = 1;
    bridge
        .sessions()
        .register(session_timestamp, Box::new(SyntheticSession { texture: None }))?;

    let manager = bridge.texture_manager(config.texture_format);
    let texture = tokio::time::timeout(
        OPERATION_TIMEOUT,
        manager.create(resolution, session_timestamp),
    )
    .await
    .map_err(|_| "Timed out creating texture")??;
    println!("Texture {} created", texture.id);

    let converter = Arc::new(bridge.converter(resolution)?);
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel::<FrameProcessed>();
    converter.subscribe(move |frame: &FrameProcessed| {
        let _ = frame_tx.send(frame.clone());
    });
    let channel = FrameChannel::with_handler(converter.clone());

    let pool = bridge.pool();
    for index in 0..frames {
        let frame = SyntheticFrame::new(resolution, index);
        let timestamp_ns = i64::from(index + 1) * 33_333_333;
        channel.deliver(&frame.view(timestamp_ns));

        let processed = tokio::time::timeout(OPERATION_TIMEOUT, frame_rx.recv())
            .await
            .map_err(|_| "Timed out waiting for converted frame")?
            .ok_or("Converter stopped")?;

        let source = SourceId(u64::from(index));
        pool.register_source(source, processed.surface)?;
        let updated = tokio::time::timeout(OPERATION_TIMEOUT, manager.update(source)).await;
        pool.deregister_source(source);
        updated.map_err(|_| "Timed out updating texture")??;

        info!(frame = index, timestamp_ns = processed.timestamp_ns, "Frame delivered to texture");
    }

    let image = bridge.read_texture(texture.id).await?;
    image.save(&output_path)?;

    channel.clear_handler();
    converter.dispose();
    tokio::time::timeout(OPERATION_TIMEOUT, manager.destroy())
        .await
        .map_err(|_| "Timed out destroying texture")??;
    bridge.shutdown();

    println!(
        "Frames: {} delivered, {} converted, {} dropped",
        channel.delivered_count(),
        converter.processed_count(),
        converter.dropped_count()
    );
    println!("Saved: {}", output_path.display());
    Ok(())
}

/// Print adapter and kernel information
pub fn info(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("camera-bridge {}", constants::app_info::version());
    println!(
        "Kernel: ABI v{}, {}x{} workgroups, entry point '{}'",
        kernel::ABI_VERSION,
        kernel::WORKGROUP_SIZE,
        kernel::WORKGROUP_SIZE,
        kernel::ENTRY_POINT
    );

    let resolution = config.resolution;
    println!(
        "Dispatch for {}: {}x{} workgroups",
        resolution,
        compute_dispatch_size(resolution.width, kernel::WORKGROUP_SIZE),
        compute_dispatch_size(resolution.height, kernel::WORKGROUP_SIZE)
    );

    probe_gpu(&config.gpu);
    Ok(())
}

fn probe_gpu(settings: &GpuSettings) {
    match pollster::block_on(create_compute_device("Adapter Probe", settings)) {
        Ok((_, _, gpu)) => {
            println!("GPU: {}", gpu.adapter_name);
            println!("  Backend: {:?}", gpu.backend);
            println!("  Software fallback: {}", gpu.is_fallback);
        }
        Err(e) => {
            println!("GPU: unavailable ({})", e);
            println!("  Conversion will use the CPU kernel");
        }
    }
}
