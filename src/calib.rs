// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Stereo calibration metadata and its rate-limited publication cache.
//!
//! The calibration file is a JSON object of named numeric arrays written at
//! calibration time: per-camera intrinsics (`M1`/`M2`), distortion
//! (`D1`/`D2`), rectification (`R1`/`R2`), projection (`P1`/`P2`), the image
//! `size`, the stereo baseline rotation `R` and translation `T`, and the
//! calibration-time `Q` matrix.  A missing or unreadable file only degrades
//! camera-info publication; the rest of the pipeline is unaffected.
//!
//! Camera info changes at device-reconfiguration speed while frames arrive
//! at sensor rate, so the cache republishes at most once per wall-clock
//! second, substituting the live frame Q matrix whenever it is valid.

use crate::frame::Error;
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{CameraInfo, RegionOfInterest},
    std_msgs::Header,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Republication interval for camera info.
const PUBLISH_INTERVAL_NS: u64 = 1_000_000_000;

/// Parsed stereo calibration record, immutable after load.
#[derive(Clone, Debug)]
pub struct Calibration {
    pub size: (u32, u32),
    pub d1: Vec<f64>,
    pub m1: [f64; 9],
    pub r1: [f64; 9],
    pub p1: [f64; 12],
    pub d2: Vec<f64>,
    pub m2: [f64; 9],
    pub r2: [f64; 9],
    pub p2: [f64; 12],
    pub q: [f64; 16],
    pub t: [f64; 3],
    pub r: [f64; 9],
}

impl Calibration {
    /// Load and parse a calibration file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse a calibration record from JSON text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let root: Value = serde_json::from_str(text)?;
        let map = root
            .as_object()
            .ok_or_else(|| Error::Calibration("root must be a JSON object".into()))?;

        let size = number_array::<2>(map, "size")?;

        Ok(Self {
            size: (size[0] as u32, size[1] as u32),
            d1: number_vec(map, "D1")?,
            m1: number_array(map, "M1")?,
            r1: number_array(map, "R1")?,
            p1: number_array(map, "P1")?,
            d2: number_vec(map, "D2")?,
            m2: number_array(map, "M2")?,
            r2: number_array(map, "R2")?,
            p2: number_array(map, "P2")?,
            q: number_array(map, "Q")?,
            t: number_array(map, "T")?,
            r: number_array(map, "R")?,
        })
    }
}

/// Read a variable-length numeric array (distortion coefficients).
fn number_vec(map: &Map<String, Value>, key: &str) -> Result<Vec<f64>, Error> {
    let values = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Calibration(format!("missing array field {}", key)))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| Error::Calibration(format!("non-numeric value in {}", key)))
        })
        .collect()
}

/// Read a fixed-length numeric array; a length mismatch is a format error.
fn number_array<const N: usize>(map: &Map<String, Value>, key: &str) -> Result<[f64; N], Error> {
    let values = number_vec(map, key)?;
    values.try_into().map_err(|v: Vec<f64>| {
        Error::Calibration(format!("field {} has {} values, expected {}", key, v.len(), N))
    })
}

/// Stereo camera info message: per-camera metadata plus the stereo
/// baseline and the disparity-to-depth matrix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StereoCameraInfo {
    pub header: Header,
    pub left_info: CameraInfo,
    pub right_info: CameraInfo,
    pub q: [f64; 16],
    pub t_left_right: [f64; 3],
    pub r_left_right: [f64; 9],
}

/// Lazily-built, rate-limited camera info cache.
///
/// The message is derived once from the calibration record; each publish
/// tick only refreshes the timestamps and the Q matrix.
pub struct CameraInfoCache {
    calibration: Option<Calibration>,
    frame_id: String,
    msg: Option<StereoCameraInfo>,
    last_publish_ns: Option<u64>,
}

impl CameraInfoCache {
    pub fn new(calibration: Option<Calibration>, frame_id: &str) -> Self {
        Self {
            calibration,
            frame_id: frame_id.to_string(),
            msg: None,
            last_publish_ns: None,
        }
    }

    /// The loaded calibration record, if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Rate-limited publication tick.
    ///
    /// Returns the message to publish at most once per second, with the
    /// live frame Q substituted whenever it is non-degenerate (first
    /// element non-zero).  Without a calibration record nothing is ever
    /// published.
    pub fn tick(&mut self, live_q: &[f32; 16], stamp: Time, now_ns: u64) -> Option<&StereoCameraInfo> {
        let calibration = self.calibration.as_ref()?;

        if let Some(last) = self.last_publish_ns {
            if now_ns.saturating_sub(last) < PUBLISH_INTERVAL_NS {
                return None;
            }
        }

        if self.msg.is_none() {
            self.msg = Some(build_info(calibration, &self.frame_id));
        }

        let msg = self.msg.as_mut().unwrap();
        if live_q[0] != 0.0 {
            for (dst, src) in msg.q.iter_mut().zip(live_q.iter()) {
                *dst = *src as f64;
            }
        }

        msg.header.stamp = stamp.clone();
        msg.left_info.header.stamp = stamp.clone();
        msg.right_info.header.stamp = stamp;
        self.last_publish_ns = Some(now_ns);

        Some(self.msg.as_ref().unwrap())
    }
}

fn build_info(calibration: &Calibration, frame_id: &str) -> StereoCameraInfo {
    let header = Header {
        stamp: Time { sec: 0, nanosec: 0 },
        frame_id: frame_id.to_string(),
    };

    StereoCameraInfo {
        header: header.clone(),
        left_info: camera_info(
            &header,
            calibration.size,
            &calibration.d1,
            calibration.m1,
            calibration.r1,
            calibration.p1,
        ),
        right_info: camera_info(
            &header,
            calibration.size,
            &calibration.d2,
            calibration.m2,
            calibration.r2,
            calibration.p2,
        ),
        q: calibration.q,
        t_left_right: calibration.t,
        r_left_right: calibration.r,
    }
}

fn camera_info(
    header: &Header,
    size: (u32, u32),
    d: &[f64],
    k: [f64; 9],
    r: [f64; 9],
    p: [f64; 12],
) -> CameraInfo {
    CameraInfo {
        header: header.clone(),
        width: size.0,
        height: size.1,
        distortion_model: String::from("plumb_bob"),
        d: d.to_vec(),
        k,
        r,
        p,
        binning_x: 1,
        binning_y: 1,
        roi: RegionOfInterest {
            x_offset: 0,
            y_offset: 0,
            height: 0,
            width: 0,
            do_rectify: false,
        },
    }
}
