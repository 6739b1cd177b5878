// SPDX-License-Identifier: GPL-3.0-only

//! Reference implementation of the YUV 4:2:0 to RGBA kernel
//!
//! Mirrors `yuv420_to_rgba.wgsl` operation for operation. Used by the CPU
//! processor and to check GPU output.

use crate::capture::PlaneStrides;
use crate::constants::bt601;
use crate::types::Resolution;
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

/// Uniform block bound at `kernel::BINDING_PARAMS`
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct ConvertParams {
    pub width: u32,
    pub height: u32,
    pub y_row_stride: u32,
    pub uv_row_stride: u32,
    pub uv_pixel_stride: u32,
    pub _pad: [u32; 3],
}

impl ConvertParams {
    pub fn new(resolution: Resolution, strides: PlaneStrides) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            y_row_stride: strides.y_row_stride,
            uv_row_stride: strides.uv_row_stride,
            uv_pixel_stride: strides.uv_pixel_stride,
            _pad: [0; 3],
        }
    }
}

/// Source row for output row `y` of an image `height` rows tall
#[inline]
pub fn flipped_row(y: u32, height: u32) -> u32 {
    height - 1 - y
}

/// Byte offset of the luma sample for output pixel (x, y)
#[inline]
pub fn luma_index(x: u32, y: u32, params: &ConvertParams) -> usize {
    let row = flipped_row(y, params.height) as usize;
    row * params.y_row_stride as usize + x as usize
}

/// Byte offset of the chroma sample shared by the 2x2 block around (x, y)
#[inline]
pub fn chroma_index(x: u32, y: u32, params: &ConvertParams) -> usize {
    let row = (flipped_row(y, params.height) / 2) as usize;
    row * params.uv_row_stride as usize + (x / 2) as usize * params.uv_pixel_stride as usize
}

/// BT.601 conversion of one sample triple to normalized RGBA
pub fn bt601_to_rgba(y: u8, u: u8, v: u8) -> [f32; 4] {
    let yf = y as f32 + bt601::LUMA_OFFSET;
    let uf = u as f32 - bt601::CHROMA_OFFSET;
    let vf = v as f32 - bt601::CHROMA_OFFSET;

    let r = yf + bt601::CR_TO_R * vf;
    let g = yf - bt601::CB_TO_G * uf - bt601::CR_TO_G * vf;
    let b = yf + bt601::CB_TO_B * uf;

    [
        (r / 255.0).clamp(0.0, 1.0),
        (g / 255.0).clamp(0.0, 1.0),
        (b / 255.0).clamp(0.0, 1.0),
        1.0,
    ]
}

/// Store a normalized channel the way an rgba8unorm storage write does
#[inline]
pub fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Run the kernel over a whole frame. Reads past the end of a plane yield 0.
pub fn convert_yuv420_to_rgba(y: &[u8], u: &[u8], v: &[u8], params: &ConvertParams) -> RgbaImage {
    let sample = |plane: &[u8], index: usize| plane.get(index).copied().unwrap_or(0);

    RgbaImage::from_fn(params.width, params.height, |x, row| {
        let luma = sample(y, luma_index(x, row, params));
        let chroma = chroma_index(x, row, params);
        let rgba = bt601_to_rgba(luma, sample(u, chroma), sample(v, chroma));
        image::Rgba(rgba.map(to_unorm8))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_4x4() -> ConvertParams {
        ConvertParams::new(Resolution::new(4, 4), PlaneStrides::planar(4))
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ConvertParams>(), 32);
    }

    #[test]
    fn test_flip_and_subsample_indices_4x4() {
        let params = params_4x4();

        assert_eq!(flipped_row(0, 4), 3);
        assert_eq!(flipped_row(3, 4), 0);

        // Output row 0 reads source row 3
        assert_eq!(luma_index(0, 0, &params), 12);
        assert_eq!(luma_index(3, 0, &params), 15);
        assert_eq!(luma_index(2, 3, &params), 2);

        // Source row 3 -> chroma row 1; x 0..1 -> column 0, x 2..3 -> column 1
        assert_eq!(chroma_index(0, 0, &params), 2);
        assert_eq!(chroma_index(1, 0, &params), 2);
        assert_eq!(chroma_index(2, 0, &params), 3);
        assert_eq!(chroma_index(3, 1, &params), 3);
        assert_eq!(chroma_index(3, 2, &params), 1);
        assert_eq!(chroma_index(0, 3, &params), 0);
    }

    #[test]
    fn test_chroma_index_with_pixel_stride() {
        let params = ConvertParams::new(Resolution::new(4, 4), PlaneStrides::semi_planar(4));
        assert_eq!(chroma_index(2, 0, &params), 4 + 2);
        assert_eq!(chroma_index(3, 3, &params), 2);
    }

    #[test]
    fn test_white_point_is_uniform() {
        let params = ConvertParams::new(Resolution::new(6, 5), PlaneStrides::planar(6));
        let y = vec![235u8; 30];
        let uv = vec![128u8; 15];
        let image = convert_yuv420_to_rgba(&y, &uv, &uv, &params);

        let first = *image.get_pixel(0, 0);
        assert!(image.pixels().all(|p| *p == first));
        assert_eq!(first.0[3], 255);
        // 235 + 16 = 251, with neutral chroma
        assert_eq!(first.0, [251, 251, 251, 255]);
    }

    #[test]
    fn test_channels_clamp() {
        assert_eq!(bt601_to_rgba(255, 255, 255).map(to_unorm8)[0], 255);
        assert_eq!(bt601_to_rgba(0, 0, 0).map(to_unorm8)[2], 0);
    }

    #[test]
    fn test_vertical_flip() {
        let params = ConvertParams::new(Resolution::new(2, 2), PlaneStrides::planar(2));
        // Source row 0 dark, source row 1 bright
        let y = [0u8, 0, 200, 200];
        let uv = [128u8];
        let image = convert_yuv420_to_rgba(&y, &uv, &uv, &params);
        assert!(image.get_pixel(0, 0).0[0] > image.get_pixel(0, 1).0[0]);
    }

    #[test]
    fn test_out_of_range_reads_are_zero() {
        let params = ConvertParams::new(Resolution::new(2, 2), PlaneStrides::planar(2));
        let image = convert_yuv420_to_rgba(&[], &[], &[], &params);
        assert_eq!(image.get_pixel(0, 0).0, bt601_to_rgba(0, 0, 0).map(to_unorm8));
    }
}
