// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Image plane encoding into ROS image messages.
//!
//! Each publisher owns one [`ImageEncoder`] with a persistent message whose
//! data buffer is reused across frames and only reallocated on a resolution
//! or format change.  Row stride padding from the device buffer is skipped
//! during the copy; published rows are tightly packed.

use crate::frame::ImagePlane;
use edgefirst_schemas::{builtin_interfaces::Time, sensor_msgs::Image, std_msgs::Header};

/// Persistent encoder for one image publication channel.
pub struct ImageEncoder {
    msg: Image,
}

impl ImageEncoder {
    pub fn new(frame_id: &str) -> Self {
        Self {
            msg: Image {
                header: Header {
                    stamp: Time { sec: 0, nanosec: 0 },
                    frame_id: frame_id.to_string(),
                },
                height: 0,
                width: 0,
                encoding: String::new(),
                is_bigendian: 0,
                step: 0,
                data: Vec::new(),
            },
        }
    }

    /// Encode a pixel plane into the cached message.
    ///
    /// The encoding follows the plane format: `rgb8`, `mono8`, or `mono16`
    /// for 12-bit planes (valid bits in the LSBs).
    pub fn encode(&mut self, plane: &ImagePlane, stamp: Time) -> &Image {
        let row_bytes = plane.row_bytes();
        self.prepare(
            plane.width,
            plane.height,
            row_bytes,
            plane.format.encoding(),
            stamp,
        );

        for (y, dst) in self.msg.data.chunks_exact_mut(row_bytes).enumerate() {
            dst.copy_from_slice(plane.row(y));
        }

        &self.msg
    }

    /// Encode a color-coded BGR canvas into the cached message.
    pub fn encode_bgr(&mut self, canvas: &[u8], width: u32, height: u32, stamp: Time) -> &Image {
        let row_bytes = width as usize * 3;
        self.prepare(width, height, row_bytes, "bgr8", stamp);
        self.msg.data.copy_from_slice(canvas);
        &self.msg
    }

    /// Refresh the message header and structural metadata, resizing the
    /// data buffer only when the geometry or encoding changed.
    fn prepare(&mut self, width: u32, height: u32, row_bytes: usize, encoding: &str, stamp: Time) {
        let needed = row_bytes * height as usize;
        if self.msg.data.len() != needed {
            self.msg.data.resize(needed, 0);
        }
        if self.msg.encoding != encoding {
            self.msg.encoding = encoding.to_string();
        }

        self.msg.width = width;
        self.msg.height = height;
        self.msg.step = row_bytes as u32;
        self.msg.is_bigendian = 0;
        self.msg.header.stamp = stamp;
    }
}
