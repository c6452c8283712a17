// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use stereopub::{
    args::Args,
    calib::Calibration,
    frame::{timestamp, to_ros_time, Error, PixelFormat},
    pipeline::{FrameRate, PipelineConfig, StereoPipeline},
    reproject::QReprojector,
    source::{FrameSource, PatternSource},
    transform::{NoOrientation, OrientationSource, TransformBroadcaster},
};
use tracing::{debug, error, info, warn};
use zenoh::{
    bytes::{Encoding, ZBytes},
    matching::MatchingListener,
    pubsub::Publisher,
    qos::{CongestionControl, Priority},
    Session,
};

/// One publication channel with live consumer tracking.
///
/// The matching listener flips `active` as subscribers come and go, so the
/// main loop can skip producing artifacts nobody is listening to.
struct Sink<'a> {
    publisher: Publisher<'a>,
    _listener: MatchingListener<()>,
    active: Arc<AtomicBool>,
    encoding: Encoding,
}

impl<'a> Sink<'a> {
    async fn declare(
        session: &'a Session,
        key: String,
        schema: &str,
        priority: Priority,
    ) -> Result<Sink<'a>, Box<dyn std::error::Error + Send + Sync>> {
        let publisher = session
            .declare_publisher(key)
            .priority(priority)
            .congestion_control(CongestionControl::Drop)
            .await?;

        let active = Arc::new(AtomicBool::new(false));
        let flag = active.clone();
        let listener = publisher
            .matching_listener()
            .callback(move |status| flag.store(status.matching(), Ordering::Relaxed))
            .await?;

        Ok(Sink {
            publisher,
            _listener: listener,
            active,
            encoding: Encoding::APPLICATION_CDR.with_schema(schema),
        })
    }

    fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    async fn publish<T: Serialize>(&self, msg: &T) {
        let payload = match edgefirst_schemas::serde_cdr::serialize(msg) {
            Ok(v) => ZBytes::from(v),
            Err(e) => {
                error!(
                    "could not encode message for {}: {:?}",
                    self.publisher.key_expr(),
                    e
                );
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .put(payload)
            .encoding(self.encoding.clone())
            .await
        {
            error!("publish error on {}: {:?}", self.publisher.key_expr(), e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .init();

    if args.delay > 0 {
        info!("delaying startup by {} seconds", args.delay);
        tokio::time::sleep(Duration::from_secs(args.delay)).await;
    }

    // A missing or unreadable calibration only disables camera info; the
    // frame Q matrix still drives reconstruction.
    let calibration = match &args.calibration {
        Some(path) => match Calibration::load(path) {
            Ok(c) => {
                info!("loaded calibration from {}", path.display());
                Some(c)
            }
            Err(e) => {
                warn!("could not load calibration {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let session = zenoh::open(zenoh::Config::from(args.clone())).await?;
    debug!("opened zenoh session");

    let topic = &args.stereo_topic;
    let left = Sink::declare(
        &session,
        format!("{topic}/left/image"),
        "sensor_msgs/msg/Image",
        Priority::DataHigh,
    )
    .await?;
    let right = Sink::declare(
        &session,
        format!("{topic}/right/image"),
        "sensor_msgs/msg/Image",
        Priority::DataHigh,
    )
    .await?;
    let disparity = Sink::declare(
        &session,
        format!("{topic}/disparity"),
        "sensor_msgs/msg/Image",
        Priority::DataHigh,
    )
    .await?;
    let points = Sink::declare(
        &session,
        format!("{topic}/points"),
        "sensor_msgs/msg/PointCloud2",
        Priority::DataHigh,
    )
    .await?;
    let info = Sink::declare(
        &session,
        format!("{topic}/camera_info"),
        "edgefirst_msgs/msg/StereoCameraInfo",
        Priority::Background,
    )
    .await?;
    let tf = Sink::declare(
        &session,
        String::from("rt/tf"),
        "geometry_msgs/msg/TransformStamped",
        Priority::Background,
    )
    .await?;

    let config = PipelineConfig {
        color_mode: args.point_cloud_intensity,
        color_coding: args.color_coding,
        legend: args.legend,
        device_coordinates: args.device_coordinates,
        max_depth: args.max_depth,
        q_from_calibration: args.q_from_calibration,
        frame_id: args.frame_id.clone(),
    };
    let mut pipeline = StereoPipeline::new(&config, calibration, QReprojector::new());
    let mut source = PatternSource::new(args.width, args.height, PixelFormat::Mono8, args.fps);
    let mut orientation = NoOrientation;
    let mut broadcaster =
        TransformBroadcaster::new(&args.base_frame_id, &args.frame_id, !args.device_coordinates);
    let mut rate = FrameRate::new(timestamp()?);

    info!("publishing stereo data on {}", topic);

    loop {
        let now = timestamp()?;

        if let Some(msg) = broadcaster.update(orientation.latest(), now) {
            if tf.active() {
                tf.publish(msg).await;
            }
        }

        let frame = match source.try_receive() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(1)).await;
                continue;
            }
            Err(e @ Error::UnsupportedFormat(_)) => {
                warn!("dropping plane: {}", e);
                continue;
            }
            Err(e) => {
                error!("frame receive error: {}", e);
                return Err(e.into());
            }
        };

        let stamp = if args.device_timestamps {
            to_ros_time(frame.timestamp)
        } else {
            to_ros_time(now)
        };

        if left.active() {
            if let Some(msg) = pipeline.left_image(&frame, stamp.clone()) {
                left.publish(msg).await;
            }
        }
        if right.active() {
            if let Some(msg) = pipeline.right_image(&frame, stamp.clone()) {
                right.publish(msg).await;
            }
        }
        if disparity.active() {
            if let Some(msg) = pipeline.disparity_image(&frame, stamp.clone()) {
                disparity.publish(msg).await;
            }
        }
        if points.active() {
            match pipeline.point_cloud(&frame, stamp.clone()) {
                Ok(Some(msg)) => points.publish(msg).await,
                Ok(None) => {}
                Err(e) => error!("point cloud error: {}", e),
            }
        }
        if info.active() {
            if let Some(msg) = pipeline.camera_info(&frame, stamp, now) {
                info.publish(msg).await;
            }
        }

        rate.record(now);
    }
}
