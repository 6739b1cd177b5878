// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants
//!
//! The `kernel` module is a fixed, versioned ABI shared by the WGSL kernel and
//! the Rust side. Renaming or reordering its bindings is a breaking change and
//! must bump [`kernel::ABI_VERSION`].

use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compute kernel ABI for the YUV 4:2:0 to RGBA conversion
pub mod kernel {
    /// Version of the binding layout below
    pub const ABI_VERSION: u32 = 1;

    /// Workgroup edge length (threads per workgroup = 8x8)
    pub const WORKGROUP_SIZE: u32 = 8;

    /// Y plane, read-only storage buffer
    pub const BINDING_Y_PLANE: u32 = 0;
    /// U plane, read-only storage buffer
    pub const BINDING_U_PLANE: u32 = 1;
    /// V plane, read-only storage buffer
    pub const BINDING_V_PLANE: u32 = 2;
    /// Stride/dimension parameters, uniform buffer
    pub const BINDING_PARAMS: u32 = 3;
    /// RGBA8 output, write-only storage texture
    pub const BINDING_OUTPUT: u32 = 4;

    /// Entry point name in the WGSL module
    pub const ENTRY_POINT: &str = "main";
}

/// ITU-R BT.601 coefficients used by the conversion kernel
pub mod bt601 {
    /// Added to the raw luma sample
    pub const LUMA_OFFSET: f32 = 16.0;
    /// Subtracted from both chroma samples
    pub const CHROMA_OFFSET: f32 = 128.0;
    pub const CR_TO_R: f32 = 1.402;
    pub const CB_TO_G: f32 = 0.344136;
    pub const CR_TO_G: f32 = 0.714136;
    pub const CB_TO_B: f32 = 1.772;
}

/// Render event ids understood by the render-side dispatcher
pub mod render_events {
    pub const SETUP_TEXTURE: u32 = 1;
    pub const DESTROY_TEXTURE: u32 = 2;
    pub const UPDATE_TEXTURE: u32 = 3;
}

/// How long the render thread blocks waiting for work before re-checking its stop signal
pub const RENDER_THREAD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default name of the crate-owned render thread
pub const DEFAULT_RENDER_THREAD_NAME: &str = "camera-bridge-render";

/// Common camera stream resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionPreset {
    /// 640x480
    Vga,
    /// 1280x720
    #[default]
    Hd,
    /// 1920x1080
    FullHd,
    /// 3840x2160
    Uhd,
}

impl ResolutionPreset {
    /// All presets, smallest first
    pub const ALL: [ResolutionPreset; 4] = [
        ResolutionPreset::Vga,
        ResolutionPreset::Hd,
        ResolutionPreset::FullHd,
        ResolutionPreset::Uhd,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ResolutionPreset::Vga => "VGA",
            ResolutionPreset::Hd => "720p",
            ResolutionPreset::FullHd => "1080p",
            ResolutionPreset::Uhd => "4K",
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            ResolutionPreset::Vga => Resolution::new(640, 480),
            ResolutionPreset::Hd => Resolution::new(1280, 720),
            ResolutionPreset::FullHd => Resolution::new(1920, 1080),
            ResolutionPreset::Uhd => Resolution::new(3840, 2160),
        }
    }

    /// Parse a preset from its display name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.display_name().eq_ignore_ascii_case(name))
    }
}

/// Application information utilities
pub mod app_info {
    /// Version string injected at build time
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
