// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Disparity map color coding for human inspection.
//!
//! Maps fixed-point disparity samples (1/16 sub-pixel) onto a BGR palette
//! scaled to the device-reported disparity range.  The lookup table and the
//! output canvas are built lazily on the first disparity frame and reused;
//! the canvas is only rebuilt when the frame dimensions change.

use crate::frame::ImagePlane;
use clap::ValueEnum;
use std::fmt;

/// Width in pixels of the optional legend strip appended at the right edge.
const LEGEND_WIDTH: u32 = 16;

/// CLI selection for disparity color coding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorCoding {
    /// Publish the raw mono16 disparity map
    #[default]
    None,
    /// Rainbow palette, blue (far) to red (near)
    Rainbow,
    /// Two-color red/blue ramp
    RedBlue,
}

impl ColorCoding {
    pub fn scheme(self) -> Option<ColorScheme> {
        match self {
            ColorCoding::None => None,
            ColorCoding::Rainbow => Some(ColorScheme::Rainbow),
            ColorCoding::RedBlue => Some(ColorScheme::RedBlue),
        }
    }
}

impl fmt::Display for ColorCoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColorCoding::None => write!(f, "none"),
            ColorCoding::Rainbow => write!(f, "rainbow"),
            ColorCoding::RedBlue => write!(f, "red-blue"),
        }
    }
}

/// Disparity visualization palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorScheme {
    Rainbow,
    RedBlue,
}

/// Scalar-to-BGR lookup table over a fixed-point disparity domain.
pub struct ColorCoder {
    min: u16,
    lut: Vec<[u8; 3]>,
}

impl ColorCoder {
    /// Build a lookup table covering the inclusive domain `[min, max]`.
    ///
    /// `min` and `max` are in 1/16 sub-pixel units (full-pixel range
    /// multiplied by 16).
    pub fn new(scheme: ColorScheme, min: u16, max: u16) -> Self {
        let max = max.max(min + 1);
        let span = (max - min) as f32;
        let lut = (min..=max)
            .map(|v| {
                let t = (v - min) as f32 / span;
                match scheme {
                    ColorScheme::Rainbow => rainbow_bgr(t),
                    ColorScheme::RedBlue => red_blue_bgr(t),
                }
            })
            .collect();

        Self { min, lut }
    }

    /// BGR color for a raw disparity sample, clamped into the domain.
    #[inline]
    pub fn color(&self, value: u16) -> [u8; 3] {
        let index = (value.saturating_sub(self.min) as usize).min(self.lut.len() - 1);
        self.lut[index]
    }

    /// Number of distinct domain values.
    pub fn domain_len(&self) -> usize {
        self.lut.len()
    }
}

/// Rainbow palette: hue sweep from blue (t = 0) to red (t = 1), full
/// saturation and value, converted to BGR.
fn rainbow_bgr(t: f32) -> [u8; 3] {
    let hue = (1.0 - t.clamp(0.0, 1.0)) * 240.0;
    let h = hue / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();

    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };

    [(b * 255.0) as u8, (g * 255.0) as u8, (r * 255.0) as u8]
}

/// Two-color ramp: red at t = 0 fading into blue at t = 1.
fn red_blue_bgr(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    [(t * 255.0) as u8, 0, ((1.0 - t) * 255.0) as u8]
}

/// Cached disparity visualization canvas.
///
/// Owns the [`ColorCoder`] and a persistent BGR canvas.  The coder is
/// built from the first frame's disparity range; the canvas (including the
/// optional legend strip) is rebuilt only on a frame dimension change.
pub struct DisparityVisualizer {
    scheme: ColorScheme,
    legend: bool,
    coder: Option<ColorCoder>,
    canvas: Vec<u8>,
    width: u32,
    height: u32,
}

impl DisparityVisualizer {
    pub fn new(scheme: ColorScheme, legend: bool) -> Self {
        Self {
            scheme,
            legend,
            coder: None,
            canvas: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Canvas width for a disparity map of `frame_width` pixels.
    #[inline]
    fn canvas_width(&self, frame_width: u32) -> u32 {
        if self.legend {
            frame_width + LEGEND_WIDTH
        } else {
            frame_width
        }
    }

    /// Color-code a Mono12 disparity plane into the cached canvas.
    ///
    /// `range` is the device-reported disparity range in full pixels; the
    /// palette spans that range scaled by the 1/16 sub-pixel factor.
    /// Returns the BGR canvas and its dimensions.
    pub fn colorize(&mut self, plane: &ImagePlane, range: (u16, u16)) -> (&[u8], u32, u32) {
        if self.coder.is_none() {
            let (min, max) = range;
            self.coder = Some(ColorCoder::new(
                self.scheme,
                min.saturating_mul(16),
                max.saturating_mul(16),
            ));
        }

        let width = self.canvas_width(plane.width);
        if self.width != width || self.height != plane.height {
            self.width = width;
            self.height = plane.height;
            self.canvas = vec![0; width as usize * plane.height as usize * 3];
            if self.legend {
                self.paint_legend(plane.width);
            }
        }

        let coder = self.coder.as_ref().unwrap();
        let row_pixels = plane.width as usize;
        let canvas_stride = self.width as usize * 3;

        for y in 0..plane.height as usize {
            let src = plane.row(y);
            let dst = &mut self.canvas[y * canvas_stride..y * canvas_stride + row_pixels * 3];
            for (pair, out) in src.chunks_exact(2).zip(dst.chunks_exact_mut(3)) {
                let value = u16::from_le_bytes([pair[0], pair[1]]);
                out.copy_from_slice(&coder.color(value));
            }
        }

        (&self.canvas, self.width, self.height)
    }

    /// Paint the vertical gradient legend strip to the right of the
    /// disparity section, top = maximum disparity.
    fn paint_legend(&mut self, frame_width: u32) {
        let coder = match &self.coder {
            Some(c) => c,
            None => return,
        };

        let stride = self.width as usize * 3;
        let span = coder.domain_len().saturating_sub(1) as f32;
        let rows = self.height.max(2) as f32 - 1.0;

        for y in 0..self.height as usize {
            let t = 1.0 - y as f32 / rows;
            let value = coder.min + (t * span) as u16;
            let color = coder.color(value);
            let row = &mut self.canvas[y * stride..(y + 1) * stride];
            for px in row[frame_width as usize * 3..].chunks_exact_mut(3) {
                px.copy_from_slice(&color);
            }
        }
    }
}
