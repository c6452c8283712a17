// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Coordinate-convention remapping and depth clamping.
//!
//! The stereo device reports 3D data in its native convention (x right,
//! y down, z forward).  ROS consumers expect a right-handed x forward,
//! y left, z up frame.  The remap is a fixed signed row permutation of the
//! 4x4 reprojection matrix; the same convention change applies to the
//! device's orientation quaternion.

/// Axis index carrying depth after reconstruction.
///
/// In ROS coordinates depth lands on the first axis, in device-native
/// coordinates on the third.
#[inline]
pub fn depth_axis(ros_coordinates: bool) -> usize {
    if ros_coordinates {
        0
    } else {
        2
    }
}

/// Remap a device-native reprojection matrix into ROS coordinates.
///
/// Row-major layout: target row 0 = device row 2, target row 1 = -device
/// row 0, target row 2 = -device row 1.  Row 3 carries the perspective
/// terms and is unchanged.
pub fn q_to_ros(src: &[f32; 16]) -> [f32; 16] {
    let mut dst = [0.0f32; 16];

    dst[0] = src[8];
    dst[1] = src[9];
    dst[2] = src[10];
    dst[3] = src[11];

    dst[4] = -src[0];
    dst[5] = -src[1];
    dst[6] = -src[2];
    dst[7] = -src[3];

    dst[8] = -src[4];
    dst[9] = -src[5];
    dst[10] = -src[6];
    dst[11] = -src[7];

    dst[12] = src[12];
    dst[13] = src[13];
    dst[14] = src[14];
    dst[15] = src[15];

    dst
}

/// Remap a device orientation quaternion into ROS coordinates.
///
/// x and w pass through, y takes the negated device z, z takes the device y.
#[inline]
pub fn quaternion_to_ros(x: f64, y: f64, z: f64, w: f64) -> (f64, f64, f64, f64) {
    (x, -z, y, w)
}

/// Copy a reconstructed point buffer into a packed point-cloud payload,
/// replacing points beyond `max_depth` with NaN sentinels.
///
/// `src` holds packed 4-float points (x, y, z, scratch); `dst` is the
/// 16-byte-per-point payload in native endianness.  The copy is a single
/// linear pass with identity index mapping: ordering and point count never
/// change.  Bytes 12..16 of each destination point are left untouched so
/// previously packed color data survives.
///
/// # Panics
///
/// Panics if the buffer sizes disagree (`dst` must be `src.len() * 4`
/// bytes) or `axis` is not a coordinate axis.
pub fn copy_points_clamped(src: &[f32], dst: &mut [u8], axis: usize, max_depth: f32) {
    assert_eq!(src.len() % 4, 0);
    assert_eq!(dst.len(), src.len() * 4);
    assert!(axis < 3);

    let nan = f32::NAN.to_ne_bytes();
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(16)) {
        if s[axis] > max_depth {
            d[0..4].copy_from_slice(&nan);
            d[4..8].copy_from_slice(&nan);
            d[8..12].copy_from_slice(&nan);
        } else {
            d[0..4].copy_from_slice(&s[0].to_ne_bytes());
            d[4..8].copy_from_slice(&s[1].to_ne_bytes());
            d[8..12].copy_from_slice(&s[2].to_ne_bytes());
        }
    }
}

/// Copy a reconstructed point buffer without depth filtering.
///
/// Bytes 12..16 of each destination point are left untouched, mirroring
/// [`copy_points_clamped`].
pub fn copy_points(src: &[f32], dst: &mut [u8]) {
    assert_eq!(src.len() % 4, 0);
    assert_eq!(dst.len(), src.len() * 4);

    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(16)) {
        d[0..4].copy_from_slice(&s[0].to_ne_bytes());
        d[4..8].copy_from_slice(&s[1].to_ne_bytes());
        d[8..12].copy_from_slice(&s[2].to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q_remap_rows() {
        let mut q = [0.0f32; 16];
        for (i, v) in q.iter_mut().enumerate() {
            *v = i as f32 + 1.0;
        }

        let r = q_to_ros(&q);
        assert_eq!(&r[0..4], &[9.0, 10.0, 11.0, 12.0]);
        assert_eq!(&r[4..8], &[-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(&r[8..12], &[-5.0, -6.0, -7.0, -8.0]);
        assert_eq!(&r[12..16], &[13.0, 14.0, 15.0, 16.0]);
    }

    #[test]
    fn test_q_remap_signed_permutation() {
        // Applying the remap three times cycles rows 0-2 back to their
        // original magnitude with both negations applied; row 3 is always
        // fixed.  This verifies the transform is a pure signed permutation.
        let mut q = [0.0f32; 16];
        for (i, v) in q.iter_mut().enumerate() {
            *v = (i as f32 + 1.0) * 0.5;
        }

        let r3 = q_to_ros(&q_to_ros(&q_to_ros(&q)));
        for i in 0..12 {
            assert_eq!(r3[i].abs(), q[i].abs());
        }
        assert_eq!(&r3[12..16], &q[12..16]);
    }

    #[test]
    fn test_quaternion_remap() {
        let (x, y, z, w) = quaternion_to_ros(0.1, 0.2, 0.3, 0.9);
        assert_eq!((x, y, z, w), (0.1, -0.3, 0.2, 0.9));
    }

    fn field(dst: &[u8], point: usize, coord: usize) -> f32 {
        let base = point * 16 + coord * 4;
        f32::from_ne_bytes(dst[base..base + 4].try_into().unwrap())
    }

    #[test]
    fn test_clamp_replaces_xyz_keeps_color() {
        let src = [6.0f32, 1.0, 2.0, 0.0, 3.0, 1.0, 2.0, 0.0];
        let mut dst = [0u8; 32];
        dst[12] = 99;
        dst[28] = 88;

        copy_points_clamped(&src, &mut dst, 0, 5.0);

        // first point exceeds max depth on axis 0
        assert!(field(&dst, 0, 0).is_nan());
        assert!(field(&dst, 0, 1).is_nan());
        assert!(field(&dst, 0, 2).is_nan());
        assert_eq!(dst[12], 99);
        // second point passes through
        assert_eq!(field(&dst, 1, 0), 3.0);
        assert_eq!(field(&dst, 1, 1), 1.0);
        assert_eq!(field(&dst, 1, 2), 2.0);
        assert_eq!(dst[28], 88);
    }

    #[test]
    fn test_clamp_idempotent() {
        let src = [1.0f32, 2.0, 3.0, 0.0, 9.0, 0.0, 0.0, 0.0];
        let mut once = [0u8; 32];
        copy_points_clamped(&src, &mut once, 0, 5.0);

        // read the clamped payload back and clamp it again
        let clamped: Vec<f32> = once
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes(b.try_into().unwrap()))
            .collect();
        let mut twice = [0u8; 32];
        copy_points_clamped(&clamped, &mut twice, 0, 5.0);

        for point in 0..2 {
            for coord in 0..3 {
                let a = field(&once, point, coord);
                let b = field(&twice, point, coord);
                assert_eq!(a.is_nan(), b.is_nan());
                if !a.is_nan() {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_nan_points_stay_clamped() {
        // NaN > max_depth is false, so already-NaN points take the copy
        // branch and remain NaN.
        let src = [f32::NAN, f32::NAN, f32::NAN, 0.0];
        let mut dst = [0u8; 16];
        copy_points_clamped(&src, &mut dst, 2, 5.0);
        assert!(field(&dst, 0, 0).is_nan());
        assert!(field(&dst, 0, 2).is_nan());
    }

    #[test]
    fn test_plain_copy_keeps_color() {
        let src = [1.0f32, 2.0, 3.0, 4.0];
        let mut dst = [0u8; 16];
        dst[14] = 7;
        copy_points(&src, &mut dst);
        assert_eq!(field(&dst, 0, 0), 1.0);
        assert_eq!(field(&dst, 0, 1), 2.0);
        assert_eq!(field(&dst, 0, 2), 3.0);
        assert_eq!(dst[14], 7);
    }
}
