// SPDX-License-Identifier: GPL-3.0-only

//! Render-side executor for texture operations
//!
//! Runs on the render thread. Each render event is decoded, executed against
//! the native renderer and the capture sessions, and reported back through the
//! correlator under the texture id it targeted.

use super::correlator::OpCorrelator;
use super::descriptor::{
    DestroyDescriptor, RenderCommand, RenderEvent, SetupDescriptor, UpdateDescriptor,
};
use super::render_queue::RenderEventHandler;
use crate::capture::SessionRegistry;
use crate::texture::NativeRenderer;
use crate::types::{NativeTextureId, OpStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Executes render events and signals their completion
pub struct RenderEventDispatcher<R> {
    renderer: R,
    correlator: Arc<dyn OpCorrelator>,
    sessions: Arc<SessionRegistry>,
}

impl<R: NativeRenderer> RenderEventDispatcher<R> {
    pub fn new(
        renderer: R,
        correlator: Arc<dyn OpCorrelator>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            renderer,
            correlator,
            sessions,
        }
    }

    fn setup(&mut self, descriptor: SetupDescriptor) -> (NativeTextureId, OpStatus) {
        let texture = descriptor.texture_id();
        let token = descriptor.completion_token;

        if let Err(e) = self.renderer.setup(&descriptor) {
            error!(texture = %texture, token, error = %e, "Native texture setup failed");
            return (texture, OpStatus::Failed);
        }

        if let Err(e) = self.sessions.start(descriptor.timestamp_ns, texture) {
            warn!(texture = %texture, token, error = %e, "Tearing down texture without capture session");
            if let Err(e) = self.renderer.teardown(texture) {
                warn!(texture = %texture, error = %e, "Teardown after failed setup failed");
            }
            return (texture, OpStatus::Failed);
        }

        info!(
            texture = %texture,
            token,
            width = descriptor.width,
            height = descriptor.height,
            "Texture set up"
        );
        (texture, OpStatus::Succeeded)
    }

    fn update(&mut self, descriptor: UpdateDescriptor) -> (NativeTextureId, OpStatus) {
        let texture = descriptor.texture_id();
        let source = descriptor.source_id();

        match self.renderer.update(texture, source) {
            Ok(()) => {
                debug!(texture = %texture, source = %source, "Texture updated");
                (texture, OpStatus::Succeeded)
            }
            Err(e) => {
                warn!(texture = %texture, source = %source, error = %e, "Texture update failed");
                (texture, OpStatus::Failed)
            }
        }
    }

    fn destroy(&mut self, descriptor: DestroyDescriptor) -> (NativeTextureId, OpStatus) {
        let texture = descriptor.texture_id();

        self.sessions.close(texture);

        match self.renderer.teardown(texture) {
            Ok(()) => {
                info!(texture = %texture, "Texture torn down");
                (texture, OpStatus::Succeeded)
            }
            Err(e) => {
                warn!(texture = %texture, error = %e, "Texture teardown failed");
                (texture, OpStatus::Failed)
            }
        }
    }

    fn execute(&mut self, command: &RenderCommand) -> Result<(NativeTextureId, OpStatus), String> {
        let event = command.event().map_err(|e| e.to_string())?;
        let outcome = match event {
            RenderEvent::SetupTexture => self.setup(command.descriptor().map_err(|e| e.to_string())?),
            RenderEvent::UpdateTexture => {
                self.update(command.descriptor().map_err(|e| e.to_string())?)
            }
            RenderEvent::DestroyTexture => {
                self.destroy(command.descriptor().map_err(|e| e.to_string())?)
            }
        };
        Ok(outcome)
    }
}

impl<R: NativeRenderer> RenderEventHandler for RenderEventDispatcher<R> {
    fn on_render_event(&mut self, command: RenderCommand) {
        match self.execute(&command) {
            Ok((texture, status)) => {
                self.correlator.complete(texture, status);
            }
            Err(e) => {
                // No texture id can be recovered, so nothing can be completed
                warn!(event = command.event_id, error = %e, "Dropping render event");
            }
        }
    }
}
