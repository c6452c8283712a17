// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame acquisition seam.
//!
//! [`FrameSource`] is the contract between the pipeline and whatever feeds
//! it frames.  Sources are polled non-blocking so the main loop can keep
//! servicing the transform broadcaster between frames.  [`PatternSource`]
//! generates a paced synthetic stereo scene for bench rigs and soak runs
//! without camera hardware.

use crate::frame::{timestamp, Error, Frame, FrameBuffer, OwnedPlane, PixelFormat};

/// Non-blocking frame supplier.
///
/// `try_receive` returns `Ok(None)` when no frame is pending.  The returned
/// view borrows the source's internal buffers and is valid until the next
/// call.
pub trait FrameSource {
    fn try_receive(&mut self) -> Result<Option<Frame<'_>>, Error>;
}

/// A finite, pre-recorded frame sequence (tests and replay).
pub struct TestFrameSource {
    frames: Vec<FrameBuffer>,
    next: usize,
}

impl TestFrameSource {
    pub fn new(frames: Vec<FrameBuffer>) -> Self {
        Self { frames, next: 0 }
    }
}

impl FrameSource for TestFrameSource {
    fn try_receive(&mut self) -> Result<Option<Frame<'_>>, Error> {
        match self.frames.get(self.next) {
            Some(buf) => {
                self.next += 1;
                Ok(Some(buf.view()))
            }
            None => Ok(None),
        }
    }
}

/// Paced synthetic stereo scene.
///
/// Left and right images carry a diagonal gradient shifted by the scene
/// disparity; the disparity map is a horizontal ramp over the device's
/// sub-pixel fixed point range with an invalid band on the right edge.  The
/// Q matrix is a plausible reprojection for the synthetic geometry, so the
/// full pipeline downstream of acquisition runs unmodified.
pub struct PatternSource {
    buf: FrameBuffer,
    format: PixelFormat,
    interval_ns: u64,
    next_due_ns: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, format: PixelFormat, fps: u32) -> Self {
        let mut buf = FrameBuffer {
            q: pattern_q(width, height),
            disparity_range: (0, 64),
            ..FrameBuffer::default()
        };
        buf.left = Some(empty_plane(width, height, format));
        buf.right = Some(empty_plane(width, height, format));
        buf.disparity = Some(empty_plane(width, height, PixelFormat::Mono12));

        Self {
            buf,
            format,
            interval_ns: 1_000_000_000 / fps.max(1) as u64,
            next_due_ns: 0,
        }
    }

    fn fill(&mut self, now_ns: u64) {
        let seq = self.buf.sequence;
        let format = self.format;
        if let Some(left) = &mut self.buf.left {
            fill_gradient(left, format, seq, 0);
        }
        if let Some(right) = &mut self.buf.right {
            fill_gradient(right, format, seq, 4);
        }
        if let Some(disparity) = &mut self.buf.disparity {
            fill_disparity_ramp(disparity, self.buf.disparity_range.1);
        }
        self.buf.timestamp = now_ns;
        self.buf.sequence = seq.wrapping_add(1);
    }
}

impl FrameSource for PatternSource {
    fn try_receive(&mut self) -> Result<Option<Frame<'_>>, Error> {
        let now = timestamp()?;
        if now < self.next_due_ns {
            return Ok(None);
        }
        self.next_due_ns = now + self.interval_ns;
        self.fill(now);
        Ok(Some(self.buf.view()))
    }
}

fn empty_plane(width: u32, height: u32, format: PixelFormat) -> OwnedPlane {
    let stride = width as usize * format.bytes_per_pixel();
    OwnedPlane {
        format,
        width,
        height,
        stride,
        data: vec![0; stride * height as usize],
    }
}

/// Diagonal gradient scrolling with the sequence number; `shift` offsets
/// the right view against the left to mimic the stereo baseline.
fn fill_gradient(plane: &mut OwnedPlane, format: PixelFormat, seq: u32, shift: u32) {
    let width = plane.width;
    for y in 0..plane.height {
        let row = &mut plane.data[y as usize * plane.stride..];
        for x in 0..width {
            let v = (x.wrapping_add(shift) + y + seq) % 256;
            match format {
                PixelFormat::Mono8 => row[x as usize] = v as u8,
                PixelFormat::Mono12 => {
                    let sample = (v as u16) << 4;
                    row[x as usize * 2..x as usize * 2 + 2]
                        .copy_from_slice(&sample.to_le_bytes());
                }
                PixelFormat::Rgb8 => {
                    let base = x as usize * 3;
                    row[base] = v as u8;
                    row[base + 1] = (v / 2) as u8;
                    row[base + 2] = (255 - v) as u8;
                }
            }
        }
    }
}

/// Horizontal disparity ramp in 1/16 sub-pixel units with the rightmost
/// eighth of each row marked invalid.
fn fill_disparity_ramp(plane: &mut OwnedPlane, max_disparity: u16) {
    let width = plane.width;
    let valid = width - width / 8;
    for y in 0..plane.height {
        let row = &mut plane.data[y as usize * plane.stride..];
        for x in 0..width {
            let sample = if x < valid {
                (x as u64 * max_disparity as u64 * 16 / width.max(1) as u64) as u16
            } else {
                0x0fff
            };
            row[x as usize * 2..x as usize * 2 + 2].copy_from_slice(&sample.to_le_bytes());
        }
    }
}

/// Reprojection matrix for the synthetic scene: unit focal length scaled by
/// width, principal point at the image center, 0.25 m baseline.
fn pattern_q(width: u32, height: u32) -> [f32; 16] {
    let f = width as f32;
    let mut q = [0.0f32; 16];
    q[0] = 1.0;
    q[3] = -(width as f32) / 2.0;
    q[5] = 1.0;
    q[7] = -(height as f32) / 2.0;
    q[11] = f;
    q[14] = 1.0 / 0.25;
    q
}
