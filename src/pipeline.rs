// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-frame publication pipeline.
//!
//! [`StereoPipeline`] owns the persistent per-channel state (image encoders,
//! disparity visualizer, reconstructor, cloud assembler, camera info cache)
//! and turns one received [`Frame`] into the artifacts its publishers have
//! asked for.  Each artifact is produced on demand so channels without
//! active consumers cost nothing.

use crate::{
    calib::{CameraInfoCache, Calibration, StereoCameraInfo},
    cloud::{CloudAssembler, ColorMode},
    color::{ColorCoding, DisparityVisualizer},
    frame::{Error, Frame, ImagePlane, PixelFormat},
    geometry::q_to_ros,
    image::ImageEncoder,
    reproject::Reconstructor,
};
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{Image, PointCloud2},
};
use tracing::{info, warn};

/// Node-level pipeline configuration, fixed at startup.
pub struct PipelineConfig {
    /// Per-point color channel for the point cloud
    pub color_mode: ColorMode,
    /// Disparity visualization palette
    pub color_coding: ColorCoding,
    /// Append a palette legend strip to color-coded disparity images
    pub legend: bool,
    /// Publish in device-native coordinates instead of ROS convention
    pub device_coordinates: bool,
    /// Maximum point depth in meters, negative disables clamping
    pub max_depth: f32,
    /// Prefer the calibration-file Q matrix over the frame's
    pub q_from_calibration: bool,
    /// Frame id stamped on every published message
    pub frame_id: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::default(),
            color_coding: ColorCoding::default(),
            legend: false,
            device_coordinates: false,
            max_depth: -1.0,
            q_from_calibration: false,
            frame_id: String::from("stereo"),
        }
    }
}

/// Persistent frame processing state.
pub struct StereoPipeline<R> {
    left_enc: ImageEncoder,
    right_enc: ImageEncoder,
    disparity_enc: ImageEncoder,
    visualizer: Option<DisparityVisualizer>,
    reconstructor: R,
    assembler: CloudAssembler,
    info: CameraInfoCache,
    q_from_calibration: bool,
    device_coordinates: bool,
    disparity_warned: bool,
    geometry_warned: bool,
}

impl<R: Reconstructor> StereoPipeline<R> {
    pub fn new(config: &PipelineConfig, calibration: Option<Calibration>, reconstructor: R) -> Self {
        if config.q_from_calibration && calibration.is_none() {
            warn!("no calibration loaded, falling back to frame Q matrices");
        }

        Self {
            left_enc: ImageEncoder::new(&config.frame_id),
            right_enc: ImageEncoder::new(&config.frame_id),
            disparity_enc: ImageEncoder::new(&config.frame_id),
            visualizer: config
                .color_coding
                .scheme()
                .map(|scheme| DisparityVisualizer::new(scheme, config.legend)),
            reconstructor,
            assembler: CloudAssembler::new(
                config.color_mode,
                config.max_depth,
                !config.device_coordinates,
                &config.frame_id,
            ),
            info: CameraInfoCache::new(calibration, &config.frame_id),
            q_from_calibration: config.q_from_calibration,
            device_coordinates: config.device_coordinates,
            disparity_warned: false,
            geometry_warned: false,
        }
    }

    /// Validate a plane's declared geometry against its buffer; a bad
    /// plane is dropped with a warning (logged once) while the rest of
    /// the frame is still processed.
    fn checked<'a>(&mut self, plane: ImagePlane<'a>, channel: &str) -> Option<ImagePlane<'a>> {
        match plane.check() {
            Ok(()) => Some(plane),
            Err(e) => {
                if !self.geometry_warned {
                    self.geometry_warned = true;
                    warn!("dropping {} plane: {}", channel, e);
                }
                None
            }
        }
    }

    /// Encode the left camera image, if the frame carries a valid one.
    pub fn left_image(&mut self, frame: &Frame, stamp: Time) -> Option<&Image> {
        let plane = self.checked(frame.left?, "left")?;
        Some(self.left_enc.encode(&plane, stamp))
    }

    /// Encode the right camera image, if the frame carries a valid one.
    pub fn right_image(&mut self, frame: &Frame, stamp: Time) -> Option<&Image> {
        let plane = self.checked(frame.right?, "right")?;
        Some(self.right_enc.encode(&plane, stamp))
    }

    /// Encode the disparity map, color-coded when a palette is configured.
    ///
    /// Color coding applies only to Mono12 disparity maps; other formats
    /// pass through raw.
    pub fn disparity_image(&mut self, frame: &Frame, stamp: Time) -> Option<&Image> {
        let plane = self.checked(frame.disparity?, "disparity")?;

        if plane.format == PixelFormat::Mono12 {
            if let Some(vis) = &mut self.visualizer {
                let (canvas, width, height) = vis.colorize(&plane, frame.disparity_range);
                return Some(self.disparity_enc.encode_bgr(canvas, width, height, stamp));
            }
        }

        Some(self.disparity_enc.encode(&plane, stamp))
    }

    /// Reconstruct and assemble the point cloud for this frame.
    ///
    /// Returns `Ok(None)` when the frame has no usable disparity map.  A
    /// degenerate Q matrix is not a skip condition: reconstruction still
    /// runs and maps every pixel to infinity.
    pub fn point_cloud(
        &mut self,
        frame: &Frame,
        stamp: Time,
    ) -> Result<Option<&PointCloud2>, Error> {
        let disparity = match frame.disparity {
            Some(plane) if plane.format == PixelFormat::Mono12 => plane,
            Some(plane) => {
                if !self.disparity_warned {
                    self.disparity_warned = true;
                    warn!("disparity plane is {}, expected mono16", plane.format);
                }
                return Ok(None);
            }
            None => return Ok(None),
        };

        let q = self.select_q(frame);
        let q = if self.device_coordinates {
            q
        } else {
            q_to_ros(&q)
        };

        let points = self.reconstructor.reconstruct(&disparity, &q)?;
        let msg = self.assembler.assemble(frame, points, stamp)?;
        Ok(Some(msg))
    }

    /// Camera info publication tick (rate-limited to 1 Hz).
    pub fn camera_info(
        &mut self,
        frame: &Frame,
        stamp: Time,
        now_ns: u64,
    ) -> Option<&StereoCameraInfo> {
        self.info.tick(&frame.q, stamp, now_ns)
    }

    /// Pick the Q matrix for reconstruction: the calibration-file matrix
    /// when configured and loaded, otherwise the frame's own — even when
    /// all-zero, since the zero-Q guard only protects the camera info
    /// cache, not reconstruction.
    fn select_q(&self, frame: &Frame) -> [f32; 16] {
        if self.q_from_calibration {
            if let Some(calibration) = self.info.calibration() {
                let mut q = [0.0f32; 16];
                for (dst, src) in q.iter_mut().zip(calibration.q.iter()) {
                    *dst = *src as f32;
                }
                return q;
            }
        }

        frame.q
    }
}

/// Once-per-second frame rate accounting for the main loop log line.
pub struct FrameRate {
    window_start_ns: u64,
    frames: u32,
}

impl FrameRate {
    pub fn new(now_ns: u64) -> Self {
        Self {
            window_start_ns: now_ns,
            frames: 0,
        }
    }

    /// Record one processed frame; logs and resets once a second elapsed.
    pub fn record(&mut self, now_ns: u64) {
        self.frames += 1;
        let elapsed = now_ns.saturating_sub(self.window_start_ns);
        if elapsed >= 1_000_000_000 {
            let fps = self.frames as f64 * 1e9 / elapsed as f64;
            info!("publishing at {:.1} fps", fps);
            self.window_start_ns = now_ns;
            self.frames = 0;
        }
    }
}
