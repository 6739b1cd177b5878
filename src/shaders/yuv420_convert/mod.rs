// SPDX-License-Identifier: GPL-3.0-only

//! YUV 4:2:0 to RGBA conversion
//!
//! Bottom-up capture planes with arbitrary row and pixel strides are converted
//! with BT.601 coefficients into an RGBA8 surface, on the GPU or with the CPU
//! reference kernel.

pub mod kernel;
mod processor;

pub use kernel::{ConvertParams, convert_yuv420_to_rgba};
pub use processor::{ConversionBackend, CpuYuv420Processor, RgbaSurface, Yuv420Processor};

/// WGSL source of the conversion kernel
pub const KERNEL_SOURCE: &str = include_str!("yuv420_to_rgba.wgsl");
