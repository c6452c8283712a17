// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point cloud payload assembly for ROS PointCloud2 messages.
//!
//! The assembler owns a persistent message whose data buffer holds one
//! packed 16-byte point per disparity pixel (x, y, z as f32 plus one
//! configurable color/intensity field at offset 12).  The field layout is
//! fixed at startup from the configured [`ColorMode`]; the buffer is only
//! reallocated on a resolution change.

use crate::{
    frame::{Error, Frame, ImagePlane, PixelFormat},
    geometry::{copy_points, copy_points_clamped, depth_axis},
};
use clap::ValueEnum;
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{PointCloud2, PointField},
    std_msgs::Header,
};
use std::fmt;
use tracing::warn;

/// Bytes per packed point: x, y, z, color/intensity field.
pub const POINT_STEP: usize = 16;

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

/// Per-point color/intensity channel selection.
///
/// Fixed for the lifetime of the node; the CLI value names match the ROS
/// image encodings they are packed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// No color field, positions only
    None,
    /// Single-byte intensity
    #[default]
    #[value(name = "mono8")]
    Intensity,
    /// Packed RGB integer in one UINT32 field
    #[value(name = "rgb8")]
    RgbCombined,
    /// Separate r/g/b FLOAT32 channels
    #[value(name = "rgb32f")]
    RgbSeparate,
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColorMode::None => write!(f, "none"),
            ColorMode::Intensity => write!(f, "mono8"),
            ColorMode::RgbCombined => write!(f, "rgb8"),
            ColorMode::RgbSeparate => write!(f, "rgb32f"),
        }
    }
}

/// Build the point field layout for a color mode.
///
/// Positions are always x/y/z FLOAT32 at offsets 0/4/8.  The color field
/// lives at offset 12: UINT8 intensity, UINT32 packed rgb, or three
/// FLOAT32 channels sharing the offset for the separate-rgb mode.
pub fn cloud_fields(mode: ColorMode) -> Vec<PointField> {
    let mut fields = vec![
        PointField {
            name: String::from("x"),
            offset: 0,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
        PointField {
            name: String::from("y"),
            offset: 4,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
        PointField {
            name: String::from("z"),
            offset: 8,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
    ];

    match mode {
        ColorMode::None => {}
        ColorMode::Intensity => fields.push(PointField {
            name: String::from("intensity"),
            offset: 12,
            datatype: PointFieldType::UINT8 as u8,
            count: 1,
        }),
        ColorMode::RgbCombined => fields.push(PointField {
            name: String::from("rgb"),
            offset: 12,
            datatype: PointFieldType::UINT32 as u8,
            count: 1,
        }),
        ColorMode::RgbSeparate => {
            for name in ["r", "g", "b"] {
                fields.push(PointField {
                    name: String::from(name),
                    offset: 12,
                    datatype: PointFieldType::FLOAT32 as u8,
                    count: 1,
                });
            }
        }
    }

    fields
}

/// Persistent point cloud assembler.
pub struct CloudAssembler {
    msg: PointCloud2,
    color_mode: ColorMode,
    max_depth: f32,
    depth_axis: usize,
    rgb_float_warned: bool,
    left_warned: bool,
    resizes: usize,
}

impl CloudAssembler {
    /// Create an assembler with a fixed color mode and depth limit.
    ///
    /// A negative `max_depth` disables depth clamping.  `ros_coordinates`
    /// selects the axis carrying depth after the coordinate remap.
    pub fn new(color_mode: ColorMode, max_depth: f32, ros_coordinates: bool, frame_id: &str) -> Self {
        Self {
            msg: PointCloud2 {
                header: Header {
                    stamp: Time { sec: 0, nanosec: 0 },
                    frame_id: frame_id.to_string(),
                },
                height: 0,
                width: 0,
                fields: cloud_fields(color_mode),
                is_bigendian: false,
                point_step: POINT_STEP as u32,
                row_step: 0,
                data: Vec::new(),
                is_dense: false,
            },
            color_mode,
            max_depth,
            depth_axis: depth_axis(ros_coordinates),
            rgb_float_warned: false,
            left_warned: false,
            resizes: 0,
        }
    }

    /// Assemble the point cloud payload for one frame.
    ///
    /// `points` is the reconstructed 4-float-per-pixel buffer for the
    /// frame's disparity map.  Color is packed from the left image when
    /// present; without one the cloud is published position-only.
    pub fn assemble(
        &mut self,
        frame: &Frame,
        points: &[f32],
        stamp: Time,
    ) -> Result<&PointCloud2, Error> {
        let disparity = frame
            .disparity
            .ok_or_else(|| Error::InvalidPlane("no disparity plane to assemble".into()))?;

        let width = disparity.width as usize;
        let height = disparity.height as usize;
        if points.len() != width * height * 4 {
            return Err(Error::Reconstruction(format!(
                "point buffer holds {} floats, disparity map needs {}",
                points.len(),
                width * height * 4
            )));
        }

        // Reallocate and refresh structural metadata only on a resolution
        // change, never per frame.
        let needed = width * height * POINT_STEP;
        if self.msg.data.len() != needed {
            self.msg.data = vec![0; needed];
            self.msg.width = disparity.width;
            self.msg.height = disparity.height;
            self.msg.row_step = (width * POINT_STEP) as u32;
            self.resizes += 1;
        }

        if self.max_depth < 0.0 {
            copy_points(points, &mut self.msg.data);
        } else {
            copy_points_clamped(points, &mut self.msg.data, self.depth_axis, self.max_depth);
        }

        // A mismatched or inconsistent left plane degrades the cloud to
        // position-only; the condition is typically persistent, so it is
        // logged once.
        if self.color_mode != ColorMode::None {
            if let Some(left) = &frame.left {
                if left.width != disparity.width || left.height != disparity.height {
                    if !self.left_warned {
                        self.left_warned = true;
                        warn!(
                            "left image {}x{} does not match disparity map {}x{}, skipping color",
                            left.width, left.height, disparity.width, disparity.height
                        );
                    }
                } else if let Err(e) = left.check() {
                    if !self.left_warned {
                        self.left_warned = true;
                        warn!("left image plane is inconsistent, skipping color: {}", e);
                    }
                } else {
                    self.pack_color(left);
                }
            }
        }

        self.msg.header.stamp = stamp;
        Ok(&self.msg)
    }

    /// Number of payload reallocations since startup (diagnostic).
    pub fn resize_count(&self) -> usize {
        self.resizes
    }

    fn pack_color(&mut self, left: &ImagePlane) {
        match left.format {
            PixelFormat::Mono8 => pack_mono8(&mut self.msg.data, left, self.color_mode),
            PixelFormat::Mono12 => pack_mono12(&mut self.msg.data, left, self.color_mode),
            PixelFormat::Rgb8 => {
                if self.color_mode == ColorMode::RgbSeparate && !self.rgb_float_warned {
                    self.rgb_float_warned = true;
                    warn!("rgb32f intensity is not supported for rgb8 images, use rgb8");
                }
                pack_rgb8(&mut self.msg.data, left, self.color_mode);
            }
        }
    }
}

#[inline]
fn replicate_rgb(intensity: u8) -> u32 {
    let v = intensity as u32;
    (v << 16) | (v << 8) | v
}

fn pack_mono8(data: &mut [u8], plane: &ImagePlane, mode: ColorMode) {
    let mut base = 12;
    for y in 0..plane.height as usize {
        for &v in plane.row(y) {
            match mode {
                ColorMode::Intensity => data[base] = v,
                ColorMode::RgbCombined => {
                    data[base..base + 4].copy_from_slice(&replicate_rgb(v).to_ne_bytes())
                }
                ColorMode::RgbSeparate => {
                    data[base..base + 4].copy_from_slice(&(v as f32 / 255.0).to_ne_bytes())
                }
                ColorMode::None => unreachable!(),
            }
            base += POINT_STEP;
        }
    }
}

fn pack_mono12(data: &mut [u8], plane: &ImagePlane, mode: ColorMode) {
    let mut base = 12;
    for y in 0..plane.height as usize {
        for pair in plane.row(y).chunks_exact(2) {
            let raw = u16::from_le_bytes([pair[0], pair[1]]);
            match mode {
                ColorMode::Intensity => data[base] = (raw / 16) as u8,
                ColorMode::RgbCombined => {
                    let v = replicate_rgb((raw / 16) as u8);
                    data[base..base + 4].copy_from_slice(&v.to_ne_bytes());
                }
                ColorMode::RgbSeparate => {
                    data[base..base + 4].copy_from_slice(&(raw as f32 / 4095.0).to_ne_bytes())
                }
                ColorMode::None => unreachable!(),
            }
            base += POINT_STEP;
        }
    }
}

fn pack_rgb8(data: &mut [u8], plane: &ImagePlane, mode: ColorMode) {
    let mut base = 12;
    for y in 0..plane.height as usize {
        for px in plane.row(y).chunks_exact(3) {
            let (r, g, b) = (px[0], px[1], px[2]);
            match mode {
                // fixed (r + 2g + b)/4 weighting, kept as-is from the
                // device vendor's implementation
                ColorMode::Intensity => {
                    data[base] = ((r as u16 + 2 * g as u16 + b as u16) / 4) as u8
                }
                ColorMode::RgbCombined => {
                    let v = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
                    data[base..base + 4].copy_from_slice(&v.to_ne_bytes());
                }
                // unsupported combination, degrades to the blue channel
                ColorMode::RgbSeparate => {
                    data[base..base + 4].copy_from_slice(&(b as f32 / 255.0).to_ne_bytes())
                }
                ColorMode::None => unreachable!(),
            }
            base += POINT_STEP;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameBuffer, OwnedPlane};

    fn stamp() -> Time {
        Time { sec: 2, nanosec: 0 }
    }

    fn mono12_plane(width: u32, height: u32, samples: &[u16]) -> OwnedPlane {
        OwnedPlane {
            format: PixelFormat::Mono12,
            width,
            height,
            stride: width as usize * 2,
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }

    fn test_frame(width: u32, height: u32, left: Option<OwnedPlane>) -> FrameBuffer {
        let n = (width * height) as usize;
        FrameBuffer {
            sequence: 1,
            timestamp: 0,
            left,
            right: None,
            disparity: Some(mono12_plane(width, height, &vec![16u16; n])),
            q: [0.0; 16],
            disparity_range: (0, 255),
        }
    }

    fn color_u32(msg: &PointCloud2, point: usize) -> u32 {
        let base = point * POINT_STEP + 12;
        u32::from_ne_bytes(msg.data[base..base + 4].try_into().unwrap())
    }

    fn color_f32(msg: &PointCloud2, point: usize) -> f32 {
        let base = point * POINT_STEP + 12;
        f32::from_ne_bytes(msg.data[base..base + 4].try_into().unwrap())
    }

    #[test]
    fn test_payload_size_invariant() {
        let buf = test_frame(4, 3, None);
        let frame = buf.view();
        let points = vec![0.0f32; 4 * 3 * 4];

        let mut asm = CloudAssembler::new(ColorMode::None, -1.0, true, "stereo");
        let msg = asm.assemble(&frame, &points, stamp()).unwrap();
        assert_eq!(msg.data.len(), 4 * 3 * 16);
        assert_eq!(msg.width, 4);
        assert_eq!(msg.height, 3);
        assert_eq!(msg.point_step, 16);
        assert_eq!(msg.row_step, 4 * 16);
        assert!(!msg.is_bigendian);
        assert!(!msg.is_dense);
    }

    #[test]
    fn test_reallocates_only_on_resolution_change() {
        let mut asm = CloudAssembler::new(ColorMode::None, -1.0, true, "stereo");

        let a = test_frame(4, 3, None);
        let b = test_frame(2, 2, None);
        let points_a = vec![0.0f32; 4 * 3 * 4];
        let points_b = vec![0.0f32; 2 * 2 * 4];

        asm.assemble(&a.view(), &points_a, stamp()).unwrap();
        asm.assemble(&a.view(), &points_a, stamp()).unwrap();
        assert_eq!(asm.resize_count(), 1);

        // A -> B -> A reallocates exactly twice more
        asm.assemble(&b.view(), &points_b, stamp()).unwrap();
        asm.assemble(&a.view(), &points_a, stamp()).unwrap();
        assert_eq!(asm.resize_count(), 3);

        asm.assemble(&a.view(), &points_a, stamp()).unwrap();
        assert_eq!(asm.resize_count(), 3);
    }

    #[test]
    fn test_mono8_combined_rgb_packing() {
        let left = OwnedPlane {
            format: PixelFormat::Mono8,
            width: 2,
            height: 1,
            stride: 2,
            data: vec![200, 10],
        };
        let buf = test_frame(2, 1, Some(left));
        let points = vec![1.0f32; 2 * 4];

        let mut asm = CloudAssembler::new(ColorMode::RgbCombined, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(color_u32(msg, 0), (200 << 16) | (200 << 8) | 200);
        assert_eq!(color_u32(msg, 1), (10 << 16) | (10 << 8) | 10);
    }

    #[test]
    fn test_mono12_packing_rules() {
        let left = OwnedPlane {
            format: PixelFormat::Mono12,
            width: 2,
            height: 1,
            stride: 4,
            data: [4095u16, 160]
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect(),
        };
        let buf = test_frame(2, 1, Some(left.clone()));
        let points = vec![1.0f32; 2 * 4];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(msg.data[12], 255); // 4095 / 16
        assert_eq!(msg.data[28], 10); // 160 / 16

        let buf = test_frame(2, 1, Some(left));
        let mut asm = CloudAssembler::new(ColorMode::RgbSeparate, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(color_f32(msg, 0), 1.0); // 4095 / 4095
        assert!((color_f32(msg, 1) - 160.0 / 4095.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgb8_luma_weighting() {
        let left = OwnedPlane {
            format: PixelFormat::Rgb8,
            width: 1,
            height: 1,
            stride: 3,
            data: vec![100, 50, 30],
        };
        let buf = test_frame(1, 1, Some(left));
        let points = vec![1.0f32; 4];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        // (100 + 2*50 + 30) / 4 = 57
        assert_eq!(msg.data[12], 57);
    }

    #[test]
    fn test_rgb8_combined_native_order() {
        let left = OwnedPlane {
            format: PixelFormat::Rgb8,
            width: 1,
            height: 1,
            stride: 3,
            data: vec![0x11, 0x22, 0x33],
        };
        let buf = test_frame(1, 1, Some(left));
        let points = vec![1.0f32; 4];

        let mut asm = CloudAssembler::new(ColorMode::RgbCombined, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(color_u32(msg, 0), 0x112233);
    }

    #[test]
    fn test_clamp_preserves_color_field() {
        let left = OwnedPlane {
            format: PixelFormat::Mono8,
            width: 1,
            height: 1,
            stride: 1,
            data: vec![123],
        };
        let buf = test_frame(1, 1, Some(left));
        // point beyond max depth on axis 0
        let points = vec![6.0f32, 1.0, 1.0, 0.0];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, 5.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();

        let x = f32::from_ne_bytes(msg.data[0..4].try_into().unwrap());
        assert!(x.is_nan());
        assert_eq!(msg.data[12], 123);
    }

    #[test]
    fn test_field_layouts() {
        let names: Vec<_> = cloud_fields(ColorMode::None)
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, ["x", "y", "z"]);

        let rgb = cloud_fields(ColorMode::RgbSeparate);
        assert_eq!(rgb.len(), 6);
        // separate channels share offset 12
        assert!(rgb[3..].iter().all(|f| f.offset == 12));

        let combined = cloud_fields(ColorMode::RgbCombined);
        assert_eq!(combined[3].datatype, PointFieldType::UINT32 as u8);
    }

    #[test]
    fn test_point_count_mismatch_rejected() {
        let buf = test_frame(2, 2, None);
        let points = vec![0.0f32; 7];
        let mut asm = CloudAssembler::new(ColorMode::None, -1.0, true, "stereo");
        assert!(matches!(
            asm.assemble(&buf.view(), &points, stamp()),
            Err(Error::Reconstruction(_))
        ));
    }

    #[test]
    fn test_mismatched_left_degrades_to_positions_only() {
        // left image does not match the disparity resolution: color is
        // skipped on every frame without failing assembly
        let left = OwnedPlane {
            format: PixelFormat::Mono8,
            width: 3,
            height: 1,
            stride: 3,
            data: vec![200, 200, 200],
        };
        let buf = test_frame(2, 1, Some(left));
        let points = vec![1.0f32; 2 * 4];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(msg.data[12], 0);

        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(msg.data[12], 0);
    }

    #[test]
    fn test_inconsistent_left_plane_skips_color() {
        // buffer too short for the declared geometry: packing would walk
        // past the slice, so the plane is dropped instead
        let left = OwnedPlane {
            format: PixelFormat::Mono8,
            width: 2,
            height: 1,
            stride: 2,
            data: vec![200],
        };
        let buf = test_frame(2, 1, Some(left));
        let points = vec![1.0f32; 2 * 4];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        assert_eq!(msg.data[12], 0);
    }

    #[test]
    fn test_stride_padding_skipped_in_packing() {
        // 2x2 mono8 left image with 2 padding bytes per row
        let left = OwnedPlane {
            format: PixelFormat::Mono8,
            width: 2,
            height: 2,
            stride: 4,
            data: vec![1, 2, 0xee, 0xee, 3, 4, 0xee, 0xee],
        };
        let buf = test_frame(2, 2, Some(left));
        let points = vec![1.0f32; 2 * 2 * 4];

        let mut asm = CloudAssembler::new(ColorMode::Intensity, -1.0, true, "stereo");
        let msg = asm.assemble(&buf.view(), &points, stamp()).unwrap();
        let intensities: Vec<u8> = (0..4).map(|i| msg.data[i * POINT_STEP + 12]).collect();
        assert_eq!(intensities, [1, 2, 3, 4]);
    }
}
