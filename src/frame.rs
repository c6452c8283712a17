// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common stereo frame types and the pipeline error type.
//!
//! A [`Frame`] is one captured instant from the stereo device: up to three
//! typed pixel planes (left image, right image, disparity map) plus the 4x4
//! disparity-to-depth reprojection matrix.  Plane buffers are borrowed from
//! the frame source and are only valid until the next receive call, so the
//! pipeline processes each frame fully before polling again.

use edgefirst_schemas::builtin_interfaces::Time;
use std::fmt;

/// Pixel encoding of an image plane.
///
/// `Mono12` samples are stored in 16-bit little-endian words with the valid
/// 12 bits in the LSBs (range 0..=4095).  Disparity maps always use `Mono12`
/// with 1/16 sub-pixel fixed-point precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit monochrome, 1 byte per pixel
    Mono8,
    /// 12-bit monochrome in 16-bit storage, 2 bytes per pixel
    Mono12,
    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,
}

impl PixelFormat {
    /// Storage width of one pixel in bytes.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono12 => 2,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// ROS image encoding string for this format.
    pub fn encoding(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "mono8",
            PixelFormat::Mono12 => "mono16",
            PixelFormat::Rgb8 => "rgb8",
        }
    }

    /// Map a device wire tag to a pixel format.
    ///
    /// Unknown tags are the "unsupported pixel format" case: the affected
    /// plane is dropped with a warning while the rest of the frame is still
    /// processed.
    pub fn from_wire(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(PixelFormat::Mono8),
            1 => Ok(PixelFormat::Rgb8),
            2 => Ok(PixelFormat::Mono12),
            other => Err(Error::UnsupportedFormat(other)),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encoding())
    }
}

/// A borrowed, typed view of one pixel plane.
///
/// `stride` is the distance between row starts in bytes and may exceed
/// `width * bytes_per_pixel()`; the padding bytes are never interpreted.
#[derive(Clone, Copy, Debug)]
pub struct ImagePlane<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> ImagePlane<'a> {
    /// Logical row width in bytes, excluding stride padding.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// The logical pixels of row `y`, padding excluded.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Validate that the buffer covers the declared geometry.
    pub fn check(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidPlane(format!(
                "empty plane: {}x{}",
                self.width, self.height
            )));
        }
        if self.stride < self.row_bytes() {
            return Err(Error::InvalidPlane(format!(
                "stride {} smaller than row width {}",
                self.stride,
                self.row_bytes()
            )));
        }
        let needed = (self.height as usize - 1) * self.stride + self.row_bytes();
        if self.data.len() < needed {
            return Err(Error::InvalidPlane(format!(
                "buffer {} bytes, geometry needs {}",
                self.data.len(),
                needed
            )));
        }
        Ok(())
    }
}

/// One captured stereo instant.
///
/// The Q matrix is row-major; an all-zero matrix means the device has not
/// provided a valid transform yet and must not override cached calibration.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// Device frame sequence number
    pub sequence: u32,
    /// Capture timestamp in nanoseconds
    pub timestamp: u64,
    /// Rectified left camera image
    pub left: Option<ImagePlane<'a>>,
    /// Rectified right camera image
    pub right: Option<ImagePlane<'a>>,
    /// Disparity map (Mono12, 1/16 sub-pixel fixed point)
    pub disparity: Option<ImagePlane<'a>>,
    /// Disparity-to-depth reprojection matrix, row-major
    pub q: [f32; 16],
    /// Device-reported disparity range in full pixels (min, max)
    pub disparity_range: (u16, u16),
}

impl<'a> Frame<'a> {
    /// True when the device supplied a valid reprojection matrix.
    #[inline]
    pub fn has_valid_q(&self) -> bool {
        self.q[0] != 0.0
    }
}

/// Owned plane storage backing a [`Frame`] view.
#[derive(Clone, Debug)]
pub struct OwnedPlane {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl OwnedPlane {
    pub fn view(&self) -> ImagePlane<'_> {
        ImagePlane {
            format: self.format,
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &self.data,
        }
    }
}

/// Owned frame storage for sources and tests (client-owned frame pattern).
///
/// The source owns the buffers and hands out [`Frame`] views; the view
/// lifetime enforces the "valid until the next receive" contract.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer {
    pub sequence: u32,
    pub timestamp: u64,
    pub left: Option<OwnedPlane>,
    pub right: Option<OwnedPlane>,
    pub disparity: Option<OwnedPlane>,
    pub q: [f32; 16],
    pub disparity_range: (u16, u16),
}

impl FrameBuffer {
    pub fn view(&self) -> Frame<'_> {
        Frame {
            sequence: self.sequence,
            timestamp: self.timestamp,
            left: self.left.as_ref().map(OwnedPlane::view),
            right: self.right.as_ref().map(OwnedPlane::view),
            disparity: self.disparity.as_ref().map(OwnedPlane::view),
            q: self.q,
            disparity_range: self.disparity_range,
        }
    }
}

impl Default for Frame<'_> {
    fn default() -> Self {
        Frame {
            sequence: 0,
            timestamp: 0,
            left: None,
            right: None,
            disparity: None,
            q: [0.0; 16],
            disparity_range: (0, 0),
        }
    }
}

/// Common error type for the stereo pipeline.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Calibration file is not valid JSON
    Json(serde_json::Error),
    /// Calibration field missing or with unexpected element count
    Calibration(String),
    /// Unknown pixel format wire tag
    UnsupportedFormat(u8),
    /// Plane geometry does not match its buffer
    InvalidPlane(String),
    /// 3D reconstruction failure
    Reconstruction(String),
    /// System time error
    SystemTime(std::time::SystemTimeError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "calibration JSON error: {}", err),
            Error::Calibration(msg) => write!(f, "calibration format error: {}", msg),
            Error::UnsupportedFormat(tag) => write!(f, "unsupported pixel format tag: {}", tag),
            Error::InvalidPlane(msg) => write!(f, "invalid image plane: {}", msg),
            Error::Reconstruction(msg) => write!(f, "reconstruction error: {}", msg),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_nanos() as u64)
}

/// Convert a nanosecond timestamp into a ROS time message.
#[inline]
pub fn to_ros_time(ns: u64) -> Time {
    Time {
        sec: (ns / 1_000_000_000) as i32,
        nanosec: (ns % 1_000_000_000) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        assert_eq!(PixelFormat::from_wire(0).unwrap(), PixelFormat::Mono8);
        assert_eq!(PixelFormat::from_wire(1).unwrap(), PixelFormat::Rgb8);
        assert_eq!(PixelFormat::from_wire(2).unwrap(), PixelFormat::Mono12);
        assert!(matches!(
            PixelFormat::from_wire(7),
            Err(Error::UnsupportedFormat(7))
        ));
    }

    #[test]
    fn test_plane_rows_skip_padding() {
        // 3x2 mono8 plane with 1 padding byte per row
        let data = [1u8, 2, 3, 0xee, 4, 5, 6, 0xee];
        let plane = ImagePlane {
            format: PixelFormat::Mono8,
            width: 3,
            height: 2,
            stride: 4,
            data: &data,
        };
        plane.check().unwrap();
        assert_eq!(plane.row(0), &[1, 2, 3]);
        assert_eq!(plane.row(1), &[4, 5, 6]);
    }

    #[test]
    fn test_plane_geometry_check() {
        let data = [0u8; 7];
        let plane = ImagePlane {
            format: PixelFormat::Mono8,
            width: 3,
            height: 2,
            stride: 4,
            data: &data,
        };
        // needs (2-1)*4 + 3 = 7 bytes, exactly available
        plane.check().unwrap();

        let short = ImagePlane {
            data: &data[..6],
            ..plane
        };
        assert!(short.check().is_err());

        let bad_stride = ImagePlane { stride: 2, ..plane };
        assert!(bad_stride.check().is_err());
    }

    #[test]
    fn test_ros_time_conversion() {
        let t = to_ros_time(3_500_000_001);
        assert_eq!(t.sec, 3);
        assert_eq!(t.nanosec, 500_000_001);
    }

    #[test]
    fn test_zero_q_invalid() {
        let frame = Frame::default();
        assert!(!frame.has_valid_q());
    }
}
