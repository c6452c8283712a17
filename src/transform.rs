// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Spatial orientation transform publication.
//!
//! The device's inertial sensor reports orientation quaternions through the
//! [`OrientationSource`] collaborator.  The broadcaster publishes the
//! transform from the configured top-level frame to the camera frame at
//! most every 10 ms, and keeps republishing the last known transform with a
//! fresh timestamp when no new sample is available so downstream consumers
//! see a live transform tree.

use crate::{frame::to_ros_time, geometry::quaternion_to_ros};
use edgefirst_schemas::{
    builtin_interfaces::Time,
    geometry_msgs::{Quaternion, Transform, TransformStamped, Vector3},
    std_msgs::Header,
};

/// Minimum interval between transform publications (100 Hz ceiling).
const MIN_INTERVAL_NS: u64 = 10_000_000;

/// A timestamped unit quaternion from the device's inertial sensor.
#[derive(Clone, Copy, Debug)]
pub struct OrientationSample {
    pub timestamp: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Collaborator contract for the device orientation channel.
///
/// `latest` drains the channel and returns the most recent sample, or
/// `None` when the device has not reported since the last poll.
pub trait OrientationSource {
    fn latest(&mut self) -> Option<OrientationSample>;
}

/// An orientation source for devices without an inertial sensor.
///
/// The broadcaster then republishes the configured static transform.
#[derive(Default)]
pub struct NoOrientation;

impl OrientationSource for NoOrientation {
    fn latest(&mut self) -> Option<OrientationSample> {
        None
    }
}

/// Rate-limited transform broadcaster.
pub struct TransformBroadcaster {
    current: TransformStamped,
    ros_coordinates: bool,
    last_publish_ns: Option<u64>,
}

impl TransformBroadcaster {
    pub fn new(base_frame_id: &str, frame_id: &str, ros_coordinates: bool) -> Self {
        Self {
            current: TransformStamped {
                header: Header {
                    stamp: Time { sec: 0, nanosec: 0 },
                    frame_id: base_frame_id.to_string(),
                },
                child_frame_id: frame_id.to_string(),
                transform: Transform {
                    translation: Vector3 {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    rotation: Quaternion {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        w: 1.0,
                    },
                },
            },
            ros_coordinates,
            last_publish_ns: None,
        }
    }

    /// Publication tick.
    ///
    /// Applies the latest orientation sample when one is available (axes
    /// remapped into ROS convention if configured), otherwise republishes
    /// the last transform unmodified except for its timestamp.  Returns
    /// `None` when inside the 10 ms rate-limit window.
    pub fn update(
        &mut self,
        sample: Option<OrientationSample>,
        now_ns: u64,
    ) -> Option<&TransformStamped> {
        if let Some(last) = self.last_publish_ns {
            if now_ns.saturating_sub(last) < MIN_INTERVAL_NS {
                return None;
            }
        }

        if let Some(sample) = sample {
            let (x, y, z, w) = if self.ros_coordinates {
                quaternion_to_ros(sample.x, sample.y, sample.z, sample.w)
            } else {
                (sample.x, sample.y, sample.z, sample.w)
            };
            self.current.transform.rotation = Quaternion { x, y, z, w };
        }

        self.current.header.stamp = to_ros_time(now_ns);
        self.last_publish_ns = Some(now_ns);
        Some(&self.current)
    }
}
