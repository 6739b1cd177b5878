// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle states of a managed texture

use crate::types::{NativeTextureId, Resolution, TextureFormat};

/// Immutable description of an allocated texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub id: NativeTextureId,
    pub resolution: Resolution,
    pub format: TextureFormat,
}

/// Closed set of lifecycle states
///
/// ```text
/// Uninitialized ─► Creating ─► Ready ⇄ Updating
///       │              │         │        │
///       └──────────────┴────► Destroying ◄┘ ─► Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureState {
    #[default]
    Uninitialized,
    Creating {
        info: TextureInfo,
    },
    Ready {
        info: TextureInfo,
    },
    Updating {
        info: TextureInfo,
    },
    /// `texture` is `None` when destroy interrupted a create that never
    /// produced a usable texture
    Destroying {
        texture: Option<TextureInfo>,
    },
    Destroyed,
}

impl TextureState {
    pub fn name(&self) -> &'static str {
        match self {
            TextureState::Uninitialized => "Uninitialized",
            TextureState::Creating { .. } => "Creating",
            TextureState::Ready { .. } => "Ready",
            TextureState::Updating { .. } => "Updating",
            TextureState::Destroying { .. } => "Destroying",
            TextureState::Destroyed => "Destroyed",
        }
    }

    /// Texture this state refers to, if any
    pub fn info(&self) -> Option<TextureInfo> {
        match *self {
            TextureState::Creating { info }
            | TextureState::Ready { info }
            | TextureState::Updating { info } => Some(info),
            TextureState::Destroying { texture } => texture,
            TextureState::Uninitialized | TextureState::Destroyed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TextureState::Destroyed)
    }

    /// Destroy has been requested or completed
    pub fn is_destroying(&self) -> bool {
        matches!(
            self,
            TextureState::Destroying { .. } | TextureState::Destroyed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TextureInfo {
        TextureInfo {
            id: NativeTextureId(1),
            resolution: Resolution::new(4, 4),
            format: TextureFormat::Rgba8Unorm,
        }
    }

    #[test]
    fn test_info_follows_state() {
        assert_eq!(TextureState::Uninitialized.info(), None);
        assert_eq!(TextureState::Ready { info: info() }.info(), Some(info()));
        assert_eq!(TextureState::Destroying { texture: None }.info(), None);
        assert_eq!(TextureState::Destroyed.info(), None);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(TextureState::default().name(), "Uninitialized");
        assert_eq!(TextureState::Updating { info: info() }.name(), "Updating");
        assert!(TextureState::Destroyed.is_terminal());
        assert!(TextureState::Destroying { texture: None }.is_destroying());
        assert!(!TextureState::Ready { info: info() }.is_destroying());
    }
}
