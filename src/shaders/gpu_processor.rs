// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU processor infrastructure
//!
//! Provides common functionality for compute processors and texture backends:
//! - Workgroup dispatch sizing
//! - Async buffer readback
//! - Texture readback into an `RgbaImage`

use crate::gpu::wgpu;
use image::RgbaImage;

/// Helper for async buffer readback (map, poll, read, unmap)
///
/// # Arguments
/// * `device` - The wgpu device for polling
/// * `buffer` - The buffer to read from (must be MAP_READ)
///
/// # Returns
/// The buffer contents as a Vec<u8>
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, String> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| "Failed to receive buffer mapping".to_string())?
        .map_err(|e| format!("Failed to map buffer: {:?}", e))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Calculate compute shader dispatch size (workgroups needed)
///
/// Given a dimension and workgroup size, returns the number of workgroups
/// needed to cover the entire dimension.
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}

/// Row pitch of a texture-to-buffer copy, padded to `COPY_BYTES_PER_ROW_ALIGNMENT`
#[inline]
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copy an RGBA8 texture back to the CPU
///
/// Rows are copied with the padded pitch wgpu requires and repacked tightly.
pub async fn read_texture_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<RgbaImage, String> {
    let width = texture.width();
    let height = texture.height();
    let padded_row = padded_bytes_per_row(width);

    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("RGBA Readback Buffer"),
        size: padded_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("RGBA Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let padded = read_buffer_async(device, &staging_buffer).await?;

    let row_bytes = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in padded.chunks(padded_row as usize).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| "Readback size does not match texture".to_string())
}
