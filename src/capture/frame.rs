// SPDX-License-Identifier: GPL-3.0-only

//! Borrowed view of one captured YUV 4:2:0 frame

use crate::errors::FrameError;

/// Row and pixel strides of the three planes, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneStrides {
    /// Bytes between the starts of consecutive Y rows
    pub y_row_stride: u32,
    /// Bytes between the starts of consecutive U/V rows
    pub uv_row_stride: u32,
    /// Bytes between consecutive samples within a U/V row
    pub uv_pixel_stride: u32,
}

impl PlaneStrides {
    /// Tightly packed planar I420 strides for `width`
    pub fn planar(width: u32) -> Self {
        Self {
            y_row_stride: width,
            uv_row_stride: width.div_ceil(2),
            uv_pixel_stride: 1,
        }
    }

    /// Semi-planar strides (interleaved chroma, pixel stride 2) for `width`
    pub fn semi_planar(width: u32) -> Self {
        Self {
            y_row_stride: width,
            uv_row_stride: width,
            uv_pixel_stride: 2,
        }
    }

    fn validate(&self) -> Result<(), FrameError> {
        if self.y_row_stride == 0 {
            return Err(FrameError::InvalidStride("y_row_stride"));
        }
        if self.uv_row_stride == 0 {
            return Err(FrameError::InvalidStride("uv_row_stride"));
        }
        if self.uv_pixel_stride == 0 {
            return Err(FrameError::InvalidStride("uv_pixel_stride"));
        }
        Ok(())
    }
}

/// One frame as delivered by the capture backend.
///
/// The lifetime ties the planes to the backend callback: a `FrameView` cannot
/// outlive the call it was created in, so handlers must copy what they keep.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub strides: PlaneStrides,
    /// Capture timestamp, monotonic nanoseconds
    pub timestamp_ns: i64,
}

impl<'a> FrameView<'a> {
    pub fn new(
        y: &'a [u8],
        u: &'a [u8],
        v: &'a [u8],
        strides: PlaneStrides,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            y,
            u,
            v,
            strides,
            timestamp_ns,
        }
    }

    /// Build a view from the raw FrameReady arguments.
    ///
    /// Null pointers and zero sizes are rejected before any slice is formed.
    ///
    /// # Safety
    ///
    /// Each non-null pointer must be valid for reads of its reported size for
    /// the whole lifetime `'a`, and the memory must not be mutated during it.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn from_raw(
        y_ptr: *const u8,
        y_size: usize,
        u_ptr: *const u8,
        v_ptr: *const u8,
        uv_size: usize,
        strides: PlaneStrides,
        timestamp_ns: i64,
    ) -> Result<Self, FrameError> {
        if y_ptr.is_null() {
            return Err(FrameError::NullPlane("Y"));
        }
        if u_ptr.is_null() {
            return Err(FrameError::NullPlane("U"));
        }
        if v_ptr.is_null() {
            return Err(FrameError::NullPlane("V"));
        }
        if y_size == 0 {
            return Err(FrameError::EmptyPlane("Y"));
        }
        if uv_size == 0 {
            return Err(FrameError::EmptyPlane("UV"));
        }

        // SAFETY: pointers are non-null and the caller guarantees validity for
        // the reported sizes over 'a.
        let (y, u, v) = unsafe {
            (
                std::slice::from_raw_parts(y_ptr, y_size),
                std::slice::from_raw_parts(u_ptr, uv_size),
                std::slice::from_raw_parts(v_ptr, uv_size),
            )
        };

        Ok(Self::new(y, u, v, strides, timestamp_ns))
    }

    /// Reject empty planes and zero strides
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.y.is_empty() {
            return Err(FrameError::EmptyPlane("Y"));
        }
        if self.u.is_empty() {
            return Err(FrameError::EmptyPlane("U"));
        }
        if self.v.is_empty() {
            return Err(FrameError::EmptyPlane("V"));
        }
        self.strides.validate()
    }
}
