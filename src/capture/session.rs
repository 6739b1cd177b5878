// SPDX-License-Identifier: GPL-3.0-only

//! Capture sessions waiting for, and bound to, native textures
//!
//! A session is registered under its capture timestamp before any texture
//! exists. The Setup render event picks it up by that timestamp, binds the new
//! texture as its output surface and starts a preview request. From then on it
//! is tracked by texture id until the Destroy render event closes it.

use crate::errors::SessionError;
use crate::types::NativeTextureId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Capture request templates a session can be started with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureTemplate {
    #[default]
    Preview,
    Record,
    StillCapture,
    VideoSnapshot,
    ZeroShutterLag,
    Manual,
}

impl fmt::Display for CaptureTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureTemplate::Preview => "preview",
            CaptureTemplate::Record => "record",
            CaptureTemplate::StillCapture => "still-capture",
            CaptureTemplate::VideoSnapshot => "video-snapshot",
            CaptureTemplate::ZeroShutterLag => "zero-shutter-lag",
            CaptureTemplate::Manual => "manual",
        };
        write!(f, "{}", name)
    }
}

/// A camera capture session as seen by the render side
pub trait CaptureSession: Send {
    /// Use `texture` as the session's output surface
    fn bind_surface(&mut self, texture: NativeTextureId) -> bool;

    /// Open the session
    fn open(&mut self) -> bool;

    /// Start (or replace) the repeating capture request
    fn request_capture(&mut self, template: CaptureTemplate) -> bool;

    /// Stop capturing and release the device
    fn close(&mut self);
}

/// A started session, or the marker left while a request call has it out
enum ActiveSlot {
    Idle(Box<dyn CaptureSession>),
    Requesting { close_requested: bool },
}

/// Sessions keyed by timestamp until started, then by texture
#[derive(Default)]
pub struct SessionRegistry {
    pending: Mutex<HashMap<i64, Box<dyn CaptureSession>>>,
    active: Mutex<HashMap<NativeTextureId, ActiveSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session for the texture that will be set up with `timestamp_ns`
    pub fn register(
        &self,
        timestamp_ns: i64,
        session: Box<dyn CaptureSession>,
    ) -> Result<(), SessionError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&timestamp_ns) {
            warn!(timestamp_ns, "Capture session already registered, ignoring");
            return Err(SessionError::AlreadyRegistered(timestamp_ns));
        }
        pending.insert(timestamp_ns, session);
        debug!(timestamp_ns, "Capture session registered");
        Ok(())
    }

    /// Drop a queued session. Returns false if none was queued.
    pub fn try_deregister(&self, timestamp_ns: i64) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&timestamp_ns)
            .is_some()
    }

    /// Bind the session queued under `timestamp_ns` to `texture` and start a
    /// preview request.
    ///
    /// The session leaves the pending set either way. On failure it is closed
    /// and dropped.
    pub fn start(&self, timestamp_ns: i64, texture: NativeTextureId) -> Result<(), SessionError> {
        let session = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&timestamp_ns);

        let Some(mut session) = session else {
            warn!(timestamp_ns, texture = %texture, "No capture session for timestamp");
            return Err(SessionError::NotRegistered(timestamp_ns));
        };

        let result = if !session.bind_surface(texture) {
            Err(SessionError::BindFailed(texture))
        } else if !session.open() {
            Err(SessionError::OpenFailed)
        } else if !session.request_capture(CaptureTemplate::Preview) {
            Err(SessionError::RequestFailed)
        } else {
            Ok(())
        };

        if let Err(e) = result {
            warn!(timestamp_ns, texture = %texture, error = %e, "Failed to start capture session");
            session.close();
            return Err(e);
        }

        info!(timestamp_ns, texture = %texture, "Capture session started");
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(texture, ActiveSlot::Idle(session));
        Ok(())
    }

    /// Replace the capture request of the session bound to `texture`.
    ///
    /// The session is called without the registry locked. A `close` for the
    /// same texture during the call is honoured once the call returns.
    pub fn request_capture(
        &self,
        texture: NativeTextureId,
        template: CaptureTemplate,
    ) -> Result<(), SessionError> {
        let mut session = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            match active.remove(&texture) {
                Some(ActiveSlot::Idle(session)) => {
                    active.insert(
                        texture,
                        ActiveSlot::Requesting {
                            close_requested: false,
                        },
                    );
                    session
                }
                Some(busy) => {
                    active.insert(texture, busy);
                    warn!(texture = %texture, "Capture request already in progress");
                    return Err(SessionError::RequestFailed);
                }
                None => return Err(SessionError::NotActive(texture)),
            }
        };

        let ok = session.request_capture(template);

        let close_requested = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let close_requested = matches!(
                active.remove(&texture),
                Some(ActiveSlot::Requesting {
                    close_requested: true
                })
            );
            if !close_requested {
                active.insert(texture, ActiveSlot::Idle(session));
                None
            } else {
                Some(session)
            }
        };

        if let Some(mut session) = close_requested {
            session.close();
            info!(texture = %texture, "Capture session closed after request");
            return Err(SessionError::NotActive(texture));
        }

        if ok {
            debug!(texture = %texture, %template, "Capture request replaced");
            Ok(())
        } else {
            Err(SessionError::RequestFailed)
        }
    }

    /// Close the session bound to `texture`. Returns false if there was none.
    ///
    /// A session inside `request_capture` is closed as soon as that call
    /// returns; this still counts as closed.
    pub fn close(&self, texture: NativeTextureId) -> bool {
        let mut session = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            match active.remove(&texture) {
                Some(ActiveSlot::Idle(session)) => session,
                Some(ActiveSlot::Requesting { .. }) => {
                    active.insert(
                        texture,
                        ActiveSlot::Requesting {
                            close_requested: true,
                        },
                    );
                    debug!(texture = %texture, "Close deferred until capture request returns");
                    return true;
                }
                None => return false,
            }
        };

        session.close();
        info!(texture = %texture, "Capture session closed");
        true
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<String>>,
    }

    struct FakeSession {
        calls: Arc<Calls>,
        open_ok: bool,
    }

    impl FakeSession {
        fn new(calls: &Arc<Calls>, open_ok: bool) -> Box<Self> {
            Box::new(Self {
                calls: calls.clone(),
                open_ok,
            })
        }

        fn record(&self, call: String) {
            self.calls.log.lock().unwrap().push(call);
        }
    }

    impl CaptureSession for FakeSession {
        fn bind_surface(&mut self, texture: NativeTextureId) -> bool {
            self.record(format!("bind {}", texture.0));
            true
        }

        fn open(&mut self) -> bool {
            self.record("open".to_string());
            self.open_ok
        }

        fn request_capture(&mut self, template: CaptureTemplate) -> bool {
            self.record(format!("request {}", template));
            true
        }

        fn close(&mut self) {
            self.record("close".to_string());
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let calls = Arc::new(Calls::default());
        let registry = SessionRegistry::new();
        registry.register(10, FakeSession::new(&calls, true)).unwrap();
        assert_eq!(
            registry.register(10, FakeSession::new(&calls, true)),
            Err(SessionError::AlreadyRegistered(10))
        );
        assert_eq!(registry.pending_count(), 1);
        assert!(registry.try_deregister(10));
        assert!(!registry.try_deregister(10));
    }

    #[test]
    fn test_start_binds_opens_and_previews() {
        let calls = Arc::new(Calls::default());
        let registry = SessionRegistry::new();
        registry.register(5, FakeSession::new(&calls, true)).unwrap();

        registry.start(5, NativeTextureId(3)).unwrap();

        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.active_count(), 1);
        assert_eq!(
            *calls.log.lock().unwrap(),
            vec!["bind 3", "open", "request preview"]
        );

        assert!(registry.close(NativeTextureId(3)));
        assert!(!registry.close(NativeTextureId(3)));
        assert_eq!(calls.log.lock().unwrap().last().unwrap(), "close");
    }

    #[test]
    fn test_failed_open_closes_session() {
        let calls = Arc::new(Calls::default());
        let registry = SessionRegistry::new();
        registry.register(5, FakeSession::new(&calls, false)).unwrap();

        assert_eq!(
            registry.start(5, NativeTextureId(1)),
            Err(SessionError::OpenFailed)
        );
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(calls.log.lock().unwrap().last().unwrap(), "close");
    }

    #[test]
    fn test_start_without_session() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.start(99, NativeTextureId(1)),
            Err(SessionError::NotRegistered(99))
        );
    }

    /// Session whose capture request tears its own texture down mid-call
    struct ClosingSession {
        registry: std::sync::Weak<SessionRegistry>,
        texture: NativeTextureId,
        calls: Arc<Calls>,
        closed_during_request: Arc<Mutex<Option<bool>>>,
    }

    impl CaptureSession for ClosingSession {
        fn bind_surface(&mut self, _texture: NativeTextureId) -> bool {
            true
        }

        fn open(&mut self) -> bool {
            true
        }

        fn request_capture(&mut self, template: CaptureTemplate) -> bool {
            if template == CaptureTemplate::Record
                && let Some(registry) = self.registry.upgrade()
            {
                *self.closed_during_request.lock().unwrap() = Some(registry.close(self.texture));
            }
            true
        }

        fn close(&mut self) {
            self.calls.log.lock().unwrap().push("close".to_string());
        }
    }

    #[test]
    fn test_close_during_request_capture_closes_session() {
        let calls = Arc::new(Calls::default());
        let closed_during_request = Arc::new(Mutex::new(None));
        let registry = Arc::new(SessionRegistry::new());
        let texture = NativeTextureId(1);
        registry
            .register(
                3,
                Box::new(ClosingSession {
                    registry: Arc::downgrade(&registry),
                    texture,
                    calls: calls.clone(),
                    closed_during_request: closed_during_request.clone(),
                }),
            )
            .unwrap();
        registry.start(3, texture).unwrap();

        assert_eq!(
            registry.request_capture(texture, CaptureTemplate::Record),
            Err(SessionError::NotActive(texture))
        );
        assert_eq!(*closed_during_request.lock().unwrap(), Some(true));
        assert_eq!(*calls.log.lock().unwrap(), vec!["close"]);
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.close(texture));
    }

    #[test]
    fn test_request_capture_on_active_session() {
        let calls = Arc::new(Calls::default());
        let registry = SessionRegistry::new();
        registry.register(1, FakeSession::new(&calls, true)).unwrap();
        registry.start(1, NativeTextureId(2)).unwrap();

        registry
            .request_capture(NativeTextureId(2), CaptureTemplate::Record)
            .unwrap();
        assert_eq!(
            registry.request_capture(NativeTextureId(9), CaptureTemplate::Record),
            Err(SessionError::NotActive(NativeTextureId(9)))
        );
        assert_eq!(calls.log.lock().unwrap().last().unwrap(), "request record");
        assert_eq!(registry.active_count(), 1);
    }
}
