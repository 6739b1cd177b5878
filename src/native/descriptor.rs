// SPDX-License-Identifier: GPL-3.0-only

//! Render events and their operation descriptors
//!
//! A render command is an event id plus a plain-old-data descriptor, the same
//! shape an engine's render-event callback receives. Descriptors are
//! `#[repr(C)]` so a native render plugin can read them directly.

use crate::constants::render_events;
use crate::errors::RenderError;
use crate::types::{NativeTextureId, Resolution, SourceId, TextureFormat};
use bytemuck::{Pod, Zeroable};

/// Render event understood by the render-side dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    SetupTexture,
    DestroyTexture,
    UpdateTexture,
}

impl RenderEvent {
    pub fn id(self) -> u32 {
        match self {
            RenderEvent::SetupTexture => render_events::SETUP_TEXTURE,
            RenderEvent::DestroyTexture => render_events::DESTROY_TEXTURE,
            RenderEvent::UpdateTexture => render_events::UPDATE_TEXTURE,
        }
    }
}

impl TryFrom<u32> for RenderEvent {
    type Error = RenderError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            render_events::SETUP_TEXTURE => Ok(RenderEvent::SetupTexture),
            render_events::DESTROY_TEXTURE => Ok(RenderEvent::DestroyTexture),
            render_events::UPDATE_TEXTURE => Ok(RenderEvent::UpdateTexture),
            other => Err(RenderError::UnknownEvent(other)),
        }
    }
}

/// Setup descriptor: attach a freshly allocated texture
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SetupDescriptor {
    pub texture: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    /// Capture timestamp the waiting session was registered under
    pub timestamp_ns: i64,
    pub completion_token: u64,
}

impl SetupDescriptor {
    pub fn new(
        texture: NativeTextureId,
        resolution: Resolution,
        format: TextureFormat,
        timestamp_ns: i64,
        completion_token: u64,
    ) -> Self {
        Self {
            texture: texture.0,
            width: resolution.width,
            height: resolution.height,
            format: format.code(),
            timestamp_ns,
            completion_token,
        }
    }

    pub fn texture_id(&self) -> NativeTextureId {
        NativeTextureId(self.texture)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Update descriptor: copy a source surface into the texture
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UpdateDescriptor {
    pub texture: u32,
    pub _pad: u32,
    pub source: u64,
    pub completion_token: u64,
}

impl UpdateDescriptor {
    pub fn new(texture: NativeTextureId, source: SourceId, completion_token: u64) -> Self {
        Self {
            texture: texture.0,
            _pad: 0,
            source: source.0,
            completion_token,
        }
    }

    pub fn texture_id(&self) -> NativeTextureId {
        NativeTextureId(self.texture)
    }

    pub fn source_id(&self) -> SourceId {
        SourceId(self.source)
    }
}

/// Destroy descriptor: detach the texture and release native resources
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DestroyDescriptor {
    pub texture: u32,
    pub _pad: u32,
    pub completion_token: u64,
}

impl DestroyDescriptor {
    pub fn new(texture: NativeTextureId, completion_token: u64) -> Self {
        Self {
            texture: texture.0,
            _pad: 0,
            completion_token,
        }
    }

    pub fn texture_id(&self) -> NativeTextureId {
        NativeTextureId(self.texture)
    }
}

/// An event id and its serialized descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    pub event_id: u32,
    pub payload: Vec<u8>,
}

impl RenderCommand {
    pub fn setup(descriptor: SetupDescriptor) -> Self {
        Self::encode(RenderEvent::SetupTexture, &descriptor)
    }

    pub fn update(descriptor: UpdateDescriptor) -> Self {
        Self::encode(RenderEvent::UpdateTexture, &descriptor)
    }

    pub fn destroy(descriptor: DestroyDescriptor) -> Self {
        Self::encode(RenderEvent::DestroyTexture, &descriptor)
    }

    fn encode<T: Pod>(event: RenderEvent, descriptor: &T) -> Self {
        Self {
            event_id: event.id(),
            payload: bytemuck::bytes_of(descriptor).to_vec(),
        }
    }

    /// Event this command carries
    pub fn event(&self) -> Result<RenderEvent, RenderError> {
        RenderEvent::try_from(self.event_id)
    }

    /// Read the payload as descriptor `T`.
    ///
    /// The payload buffer carries no alignment guarantee, so it is read
    /// unaligned.
    pub fn descriptor<T: Pod>(&self) -> Result<T, RenderError> {
        bytemuck::try_pod_read_unaligned(&self.payload).map_err(|_| {
            RenderError::MalformedPayload {
                event: self.event_id,
                expected: std::mem::size_of::<T>(),
                actual: self.payload.len(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_stable() {
        assert_eq!(RenderEvent::SetupTexture.id(), 1);
        assert_eq!(RenderEvent::DestroyTexture.id(), 2);
        assert_eq!(RenderEvent::UpdateTexture.id(), 3);
        assert_eq!(RenderEvent::try_from(9), Err(RenderError::UnknownEvent(9)));
    }

    #[test]
    fn test_setup_descriptor_layout() {
        assert_eq!(std::mem::size_of::<SetupDescriptor>(), 32);
        assert_eq!(std::mem::size_of::<UpdateDescriptor>(), 24);
        assert_eq!(std::mem::size_of::<DestroyDescriptor>(), 16);
    }

    #[test]
    fn test_setup_command_decodes() {
        let descriptor = SetupDescriptor::new(
            NativeTextureId(4),
            Resolution::new(640, 480),
            TextureFormat::Rgba8Unorm,
            123,
            9,
        );
        let command = RenderCommand::setup(descriptor);
        assert_eq!(command.event(), Ok(RenderEvent::SetupTexture));

        let decoded: SetupDescriptor = command.descriptor().unwrap();
        assert_eq!(decoded.texture_id(), NativeTextureId(4));
        assert_eq!(decoded.resolution(), Resolution::new(640, 480));
        assert_eq!(decoded.timestamp_ns, 123);
    }

    #[test]
    fn test_wrong_payload_size_is_malformed() {
        let command = RenderCommand {
            event_id: render_events::UPDATE_TEXTURE,
            payload: vec![0; 5],
        };
        assert_eq!(
            command.descriptor::<UpdateDescriptor>(),
            Err(RenderError::MalformedPayload {
                event: 3,
                expected: 24,
                actual: 5,
            })
        );
    }
}
