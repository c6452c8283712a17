// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Stereo Publisher Library
//!
//! Turns frames from a stereo depth camera into ROS 2 messages published
//! over zenoh: rectified camera images, color-coded disparity maps, dense
//! 3D point clouds, stereo camera info, and the device orientation
//! transform.
//!
//! # Architecture
//!
//! The library uses a **client-owned frame** pattern for zero-allocation
//! steady-state operation:
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────────────────────────┐
//! │  FrameSource │ ──► │  StereoPipeline                         │
//! │  (device/    │     │   ├── ImageEncoder (left/right/disp)    │
//! │   pattern/   │     │   ├── DisparityVisualizer (palette LUT) │
//! │   test)      │     │   ├── Reconstructor (Q reprojection)    │
//! └──────────────┘     │   ├── CloudAssembler (packed 16B/point) │
//!                      │   └── CameraInfoCache (1 Hz)            │
//!                      └─────────────────────────────────────────┘
//! ```
//!
//! The source owns the frame buffers and hands out borrowed [`frame::Frame`]
//! views valid until the next receive; every pipeline stage keeps its output
//! message alive across frames and reallocates only on a resolution change.
//!
//! # Modules
//!
//! - [`frame`]: frame and plane types, the pipeline error type
//! - [`image`]: image plane to ROS image encoding
//! - [`color`]: disparity color coding palettes
//! - [`geometry`]: coordinate convention remaps and depth clamping
//! - [`reproject`]: disparity to 3D reconstruction
//! - [`cloud`]: point cloud payload assembly
//! - [`calib`]: calibration loading and camera info publication
//! - [`transform`]: orientation transform broadcasting
//! - [`source`]: frame acquisition seam and synthetic sources
//! - [`pipeline`]: per-frame orchestration

pub mod args;
pub mod calib;
pub mod cloud;
pub mod color;
pub mod frame;
pub mod geometry;
pub mod image;
pub mod pipeline;
pub mod reproject;
pub mod source;
pub mod transform;

// Re-exports for convenience
pub use calib::{CameraInfoCache, Calibration, StereoCameraInfo};
pub use cloud::{CloudAssembler, ColorMode, PointFieldType};
pub use color::{ColorCoding, DisparityVisualizer};
pub use frame::{Error, Frame, FrameBuffer, ImagePlane, PixelFormat};
pub use pipeline::{PipelineConfig, StereoPipeline};
pub use reproject::{QReprojector, Reconstructor};
pub use source::{FrameSource, PatternSource, TestFrameSource};
pub use transform::{OrientationSample, OrientationSource, TransformBroadcaster};
