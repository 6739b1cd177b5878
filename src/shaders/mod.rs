// SPDX-License-Identifier: GPL-3.0-only
//! Compute shaders and their host-side processors
//!
//! The YUV 4:2:0 kernel exists twice with identical semantics: as WGSL for the
//! GPU processor and as plain Rust for the CPU fallback and for checking the
//! GPU output in tests.

mod gpu_processor;
pub mod yuv420_convert;

pub use gpu_processor::{
    compute_dispatch_size, padded_bytes_per_row, read_buffer_async, read_texture_rgba,
};
pub use yuv420_convert::{
    ConversionBackend, ConvertParams, CpuYuv420Processor, RgbaSurface, Yuv420Processor,
};
