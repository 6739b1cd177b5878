// SPDX-License-Identifier: GPL-3.0-only

//! Core value types shared by the capture, native and texture layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame or texture size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Number of pixels covered by this resolution
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of a managed texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA, linear
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded
    Rgba8UnormSrgb,
}

impl TextureFormat {
    /// Wire code used inside operation descriptors
    pub fn code(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 0,
            TextureFormat::Rgba8UnormSrgb => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TextureFormat::Rgba8Unorm),
            1 => Some(TextureFormat::Rgba8UnormSrgb),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// Opaque identifier of a natively-backed texture.
///
/// Assigned by the texture pool; zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeTextureId(pub u32);

impl NativeTextureId {
    pub const INVALID: NativeTextureId = NativeTextureId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NativeTextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a camera-side source surface used by texture updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src:{}", self.0)
    }
}

/// Outcome reported by a native completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Succeeded,
    Failed,
}

impl OpStatus {
    pub fn is_success(self) -> bool {
        self == OpStatus::Succeeded
    }
}
