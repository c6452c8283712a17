// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

use crate::{cloud::ColorMode, color::ColorCoding};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Point cloud intensity channel.  mono8 packs a single intensity byte,
    /// rgb8 a combined color integer, rgb32f separate float channels.
    #[arg(long, env, default_value = "mono8")]
    pub point_cloud_intensity: ColorMode,

    /// Disparity map color coding for the disparity image channel.
    #[arg(long, env, default_value = "none")]
    pub color_coding: ColorCoding,

    /// Append a palette legend strip to color-coded disparity images.
    #[arg(long, env)]
    pub legend: bool,

    /// Maximum point depth in meters; points beyond it become NaN.
    /// Negative values disable depth clamping.
    #[arg(long, env, default_value = "-1.0", allow_hyphen_values = true)]
    pub max_depth: f32,

    /// Publish 3D data in the device-native coordinate convention
    /// (x right, y down, z forward) instead of the ROS convention.
    #[arg(long, env)]
    pub device_coordinates: bool,

    /// Stamp messages with device capture timestamps instead of host time.
    #[arg(long, env)]
    pub device_timestamps: bool,

    /// Stereo calibration file (JSON).  Without one, camera info is not
    /// published and the frame Q matrix is always used.
    #[arg(long, env)]
    pub calibration: Option<PathBuf>,

    /// Use the calibration-file Q matrix for reconstruction instead of the
    /// per-frame matrix.
    #[arg(long, env)]
    pub q_from_calibration: bool,

    /// Startup delay in seconds before connecting.
    #[arg(long, env, default_value = "0")]
    pub delay: u64,

    /// The name of the base frame
    #[arg(long, env, default_value = "world")]
    pub base_frame_id: String,

    /// The name of the stereo camera frame
    #[arg(long, env, default_value = "stereo")]
    pub frame_id: String,

    /// stereo base topic
    #[arg(long, env, default_value = "rt/stereo")]
    pub stereo_topic: String,

    /// Synthetic source frame width
    #[arg(long, env, default_value = "640")]
    pub width: u32,

    /// Synthetic source frame height
    #[arg(long, env, default_value = "480")]
    pub height: u32,

    /// Synthetic source frame rate
    #[arg(long, env, default_value = "30")]
    pub fps: u32,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Config::default();

        config
            .insert_json5("mode", &json!(args.mode).to_string())
            .unwrap();

        if !args.connect.is_empty() {
            config
                .insert_json5("connect/endpoints", &json!(args.connect).to_string())
                .unwrap();
        }

        if !args.listen.is_empty() {
            config
                .insert_json5("listen/endpoints", &json!(args.listen).to_string())
                .unwrap();
        }

        if args.no_multicast_scouting {
            config
                .insert_json5("scouting/multicast/enabled", &json!(false).to_string())
                .unwrap();
        }

        config
            .insert_json5("scouting/multicast/interface", &json!("lo").to_string())
            .unwrap();

        config
    }
}
