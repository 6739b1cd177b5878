// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-capacity per-frame plane copies
//!
//! Capture buffers are only valid for the duration of the frame callback, so
//! each frame is copied into a `StagingFrame` before any work is posted to the
//! render queue. Capacities are fixed at construction and never grow.

use super::frame::{FrameView, PlaneStrides};
use crate::types::Resolution;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Byte capacities of the three staging planes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingLayout {
    pub y_capacity: usize,
    /// Capacity of each of the U and V planes
    pub uv_capacity: usize,
}

impl StagingLayout {
    /// Capacities for a stream of `resolution`.
    ///
    /// Y holds w*h bytes, each chroma plane ceil(w*h/2) so that interleaved
    /// chroma (pixel stride 2) fits. Both are rounded up to whole 32-bit words
    /// for the storage buffers the kernel reads. Luma is sized for tightly
    /// packed rows: with `y_row_stride > width` the last source rows (the top
    /// output rows) fall past capacity and read as 0.
    pub fn for_resolution(resolution: Resolution) -> Self {
        let pixels = resolution.pixel_count();
        Self {
            y_capacity: round_up_to_word(pixels),
            uv_capacity: round_up_to_word(pixels.div_ceil(2)),
        }
    }

    /// Whether every luma row of a `resolution` frame laid out with
    /// `strides` fits in the Y plane
    pub fn holds_luma(&self, resolution: Resolution, strides: PlaneStrides) -> bool {
        if resolution.height == 0 {
            return true;
        }
        let last_row = (resolution.height as usize - 1) * strides.y_row_stride as usize;
        last_row + resolution.width as usize <= self.y_capacity
    }

    pub fn capacity(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.y_capacity,
            Plane::U | Plane::V => self.uv_capacity,
        }
    }
}

fn round_up_to_word(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// One of the three planes of a YUV 4:2:0 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Y,
    U,
    V,
}

impl Plane {
    fn index(self) -> usize {
        match self {
            Plane::Y => 0,
            Plane::U => 1,
            Plane::V => 2,
        }
    }
}

struct StagingPlanes {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    copied: [usize; 3],
    disposed: bool,
}

impl StagingPlanes {
    fn plane_mut(&mut self, plane: Plane) -> &mut Vec<u8> {
        match plane {
            Plane::Y => &mut self.y,
            Plane::U => &mut self.u,
            Plane::V => &mut self.v,
        }
    }
}

/// Owned copy of one frame's planes
pub struct StagingFrame {
    layout: StagingLayout,
    inner: Mutex<StagingPlanes>,
}

impl StagingFrame {
    /// Allocate zeroed planes of the given capacities
    pub fn new(layout: StagingLayout) -> Self {
        Self {
            layout,
            inner: Mutex::new(StagingPlanes {
                y: vec![0; layout.y_capacity],
                u: vec![0; layout.uv_capacity],
                v: vec![0; layout.uv_capacity],
                copied: [0; 3],
                disposed: false,
            }),
        }
    }

    pub fn layout(&self) -> StagingLayout {
        self.layout
    }

    /// Copy `src` into `plane`, clamped to the plane capacity.
    ///
    /// Returns the number of bytes copied; zero once disposed. Bytes past the
    /// copied length keep whatever the previous copy left there.
    pub fn copy_in(&self, plane: Plane, src: &[u8]) -> usize {
        let mut planes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if planes.disposed {
            return 0;
        }

        let capacity = self.layout.capacity(plane);
        let len = capacity.min(src.len());
        if len < src.len() {
            trace!(?plane, src_len = src.len(), capacity, "Clamping plane copy");
        }

        planes.plane_mut(plane)[..len].copy_from_slice(&src[..len]);
        planes.copied[plane.index()] = len;
        len
    }

    /// Copy all three planes of `frame`
    pub fn fill_from(&self, frame: &FrameView<'_>) {
        self.copy_in(Plane::Y, frame.y);
        self.copy_in(Plane::U, frame.u);
        self.copy_in(Plane::V, frame.v);
    }

    /// Borrow the full-capacity plane buffers as (Y, U, V).
    ///
    /// Returns `None` once disposed.
    pub fn with_planes<R>(&self, f: impl FnOnce(&[u8], &[u8], &[u8]) -> R) -> Option<R> {
        let planes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if planes.disposed {
            return None;
        }
        Some(f(&planes.y, &planes.u, &planes.v))
    }

    /// Bytes copied into `plane` by the last `copy_in`
    pub fn copied_len(&self, plane: Plane) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .copied[plane.index()]
    }

    pub fn capacity(&self, plane: Plane) -> usize {
        self.layout.capacity(plane)
    }

    /// Free the plane memory. Idempotent.
    pub fn dispose(&self) {
        let mut planes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if planes.disposed {
            return;
        }
        planes.disposed = true;
        planes.y = Vec::new();
        planes.u = Vec::new();
        planes.v = Vec::new();
        planes.copied = [0; 3];
    }

    pub fn is_disposed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disposed
    }
}
