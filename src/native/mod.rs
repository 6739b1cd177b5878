// SPDX-License-Identifier: GPL-3.0-only

//! Render-side plumbing
//!
//! Texture operations leave the managed side as render commands, run on the
//! render thread, and come back as completions matched by texture id:
//!
//! ```text
//! TextureLifecycleManager ─register──► NativeOpCorrelator
//!         │                                   ▲
//!         └─submit─► RenderQueue ─► RenderPump ─► RenderEventDispatcher ─complete─┘
//! ```

pub mod correlator;
pub mod descriptor;
pub mod dispatch;
pub mod render_queue;
pub mod render_thread;

pub use correlator::{Continuation, NativeOpCorrelator, OpCorrelator};
pub use descriptor::{
    DestroyDescriptor, RenderCommand, RenderEvent, SetupDescriptor, UpdateDescriptor,
};
pub use dispatch::RenderEventDispatcher;
pub use render_queue::{
    PumpStatus, RenderEventHandler, RenderJob, RenderPump, RenderQueue, render_channel,
};
pub use render_thread::RenderThread;
