// SPDX-License-Identifier: MPL-2.0

//! Error types for the camera bridge
//!
//! Invalid input and protocol violations are handled locally (logged, no-op)
//! and surface to callers only as `Err` values; nothing here unwinds across
//! the native boundary.

use crate::types::{NativeTextureId, SourceId};
use std::fmt;

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum BridgeError {
    /// Frame ingestion errors
    Frame(FrameError),
    /// Texture lifecycle errors
    Texture(TextureError),
    /// YUV conversion errors
    Convert(ConvertError),
    /// Render queue / render thread errors
    Render(RenderError),
    /// Capture session errors
    Session(SessionError),
    /// Completion registry errors
    Correlator(CorrelatorError),
    /// Configuration errors
    Config(String),
    /// GPU initialization errors
    Gpu(String),
}

/// Rejected frame input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A plane pointer was null
    NullPlane(&'static str),
    /// A plane reported zero bytes
    EmptyPlane(&'static str),
    /// A stride was zero
    InvalidStride(&'static str),
}

/// Texture lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// Operation not legal in the current lifecycle state
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    /// Requested size is unusable
    InvalidResolution { width: u32, height: u32 },
    /// The pool could not allocate a texture
    AllocationFailed(String),
    /// The render backend reported failure for the operation
    NativeFailed {
        operation: &'static str,
        texture: NativeTextureId,
    },
    /// The completion continuation was dropped without firing
    CompletionDropped(NativeTextureId),
    /// Destroy was requested while the operation was in flight
    DestroyRequested,
    /// Texture id not known to the pool
    UnknownTexture(NativeTextureId),
    /// Source surface not registered
    UnknownSource(SourceId),
    /// Source surface already registered
    SourceAlreadyRegistered(SourceId),
    /// Source surface kind does not match the backend
    IncompatibleSource(SourceId),
    /// Command could not be queued
    Render(RenderError),
    /// Completion could not be registered
    Correlator(CorrelatorError),
}

/// YUV conversion errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Converter was disposed
    Disposed,
    /// Wait was cancelled by the caller
    Cancelled,
    /// Upload to GPU-side buffers failed
    UploadFailed(String),
    /// Kernel dispatch failed
    DispatchFailed(String),
    /// Conversion backend could not be initialized
    BackendUnavailable(String),
}

/// Render queue errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The render loop is gone; commands can no longer be delivered
    QueueClosed,
    /// Unknown render event id
    UnknownEvent(u32),
    /// Descriptor payload has the wrong size for its event
    MalformedPayload {
        event: u32,
        expected: usize,
        actual: usize,
    },
}

/// Capture session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A session is already registered for this timestamp
    AlreadyRegistered(i64),
    /// No session registered for this timestamp
    NotRegistered(i64),
    /// No active session bound to this texture
    NotActive(NativeTextureId),
    /// The session refused the texture
    BindFailed(NativeTextureId),
    /// The session could not be opened
    OpenFailed,
    /// The capture request was refused
    RequestFailed,
}

/// Completion registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelatorError {
    /// A continuation is already pending for this id
    AlreadyPending(NativeTextureId),
    /// The id can never complete
    InvalidId(NativeTextureId),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Frame(e) => write!(f, "Frame error: {}", e),
            BridgeError::Texture(e) => write!(f, "Texture error: {}", e),
            BridgeError::Convert(e) => write!(f, "Conversion error: {}", e),
            BridgeError::Render(e) => write!(f, "Render error: {}", e),
            BridgeError::Session(e) => write!(f, "Session error: {}", e),
            BridgeError::Correlator(e) => write!(f, "Correlator error: {}", e),
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BridgeError::Gpu(msg) => write!(f, "GPU error: {}", msg),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::NullPlane(plane) => write!(f, "{} plane pointer is null", plane),
            FrameError::EmptyPlane(plane) => write!(f, "{} plane is empty", plane),
            FrameError::InvalidStride(stride) => write!(f, "{} is zero", stride),
        }
    }
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::InvalidState { operation, state } => {
                write!(f, "Cannot {} a texture in state {}", operation, state)
            }
            TextureError::InvalidResolution { width, height } => {
                write!(f, "Invalid texture size {}x{}", width, height)
            }
            TextureError::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
            TextureError::NativeFailed { operation, texture } => {
                write!(f, "Native {} failed for texture {}", operation, texture)
            }
            TextureError::CompletionDropped(id) => {
                write!(f, "Completion for texture {} was dropped", id)
            }
            TextureError::DestroyRequested => write!(f, "Texture destroy was requested"),
            TextureError::UnknownTexture(id) => write!(f, "Unknown texture {}", id),
            TextureError::UnknownSource(id) => write!(f, "Unknown source surface {}", id),
            TextureError::SourceAlreadyRegistered(id) => {
                write!(f, "Source surface {} already registered", id)
            }
            TextureError::IncompatibleSource(id) => {
                write!(f, "Source surface {} is incompatible with this backend", id)
            }
            TextureError::Render(e) => write!(f, "{}", e),
            TextureError::Correlator(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Disposed => write!(f, "Converter was disposed"),
            ConvertError::Cancelled => write!(f, "Wait for frame was cancelled"),
            ConvertError::UploadFailed(msg) => write!(f, "Upload failed: {}", msg),
            ConvertError::DispatchFailed(msg) => write!(f, "Dispatch failed: {}", msg),
            ConvertError::BackendUnavailable(msg) => {
                write!(f, "Conversion backend unavailable: {}", msg)
            }
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::QueueClosed => write!(f, "Render queue is closed"),
            RenderError::UnknownEvent(id) => write!(f, "Unknown render event {}", id),
            RenderError::MalformedPayload {
                event,
                expected,
                actual,
            } => write!(
                f,
                "Malformed payload for render event {}: {} bytes, expected {}",
                event, actual, expected
            ),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyRegistered(ts) => {
                write!(f, "Capture session already registered for timestamp {}", ts)
            }
            SessionError::NotRegistered(ts) => {
                write!(f, "No capture session registered for timestamp {}", ts)
            }
            SessionError::NotActive(id) => write!(f, "No active session for texture {}", id),
            SessionError::BindFailed(id) => write!(f, "Session rejected texture {}", id),
            SessionError::OpenFailed => write!(f, "Capture session could not be opened"),
            SessionError::RequestFailed => write!(f, "Capture request failed"),
        }
    }
}

impl fmt::Display for CorrelatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelatorError::AlreadyPending(id) => {
                write!(f, "Operation already pending for texture {}", id)
            }
            CorrelatorError::InvalidId(id) => write!(f, "Invalid native id {}", id),
        }
    }
}

impl std::error::Error for BridgeError {}
impl std::error::Error for FrameError {}
impl std::error::Error for TextureError {}
impl std::error::Error for ConvertError {}
impl std::error::Error for RenderError {}
impl std::error::Error for SessionError {}
impl std::error::Error for CorrelatorError {}

// Conversions from sub-errors to BridgeError
impl From<FrameError> for BridgeError {
    fn from(err: FrameError) -> Self {
        BridgeError::Frame(err)
    }
}

impl From<TextureError> for BridgeError {
    fn from(err: TextureError) -> Self {
        BridgeError::Texture(err)
    }
}

impl From<ConvertError> for BridgeError {
    fn from(err: ConvertError) -> Self {
        BridgeError::Convert(err)
    }
}

impl From<RenderError> for BridgeError {
    fn from(err: RenderError) -> Self {
        BridgeError::Render(err)
    }
}

impl From<SessionError> for BridgeError {
    fn from(err: SessionError) -> Self {
        BridgeError::Session(err)
    }
}

impl From<CorrelatorError> for BridgeError {
    fn from(err: CorrelatorError) -> Self {
        BridgeError::Correlator(err)
    }
}

impl From<RenderError> for TextureError {
    fn from(err: RenderError) -> Self {
        TextureError::Render(err)
    }
}

impl From<CorrelatorError> for TextureError {
    fn from(err: CorrelatorError) -> Self {
        TextureError::Correlator(err)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
