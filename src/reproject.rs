// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Dense 3D reconstruction from disparity maps.
//!
//! [`Reconstructor`] is the seam for the reconstruction collaborator; the
//! pipeline only depends on the trait so device-vendor implementations can
//! be swapped in.  [`QReprojector`] is the native implementation: each
//! pixel's (x, y, disparity, 1) vector is multiplied by the 4x4 reprojection
//! matrix with homogeneous division.

use crate::frame::{Error, ImagePlane, PixelFormat};

/// Raw disparity sample marking an invalid (unmatched) pixel.
const INVALID_DISPARITY: u16 = 0x0fff;

/// Fixed-point sub-pixel denominator of disparity samples.
const SUBPIXEL_FACTOR: f32 = 16.0;

/// Collaborator contract for dense 3D reconstruction.
///
/// Returns one packed 4-float point (x, y, z, scratch) per disparity pixel,
/// row-major.  The returned buffer is owned by the reconstructor and valid
/// until the next call.
pub trait Reconstructor {
    fn reconstruct(&mut self, disparity: &ImagePlane<'_>, q: &[f32; 16]) -> Result<&[f32], Error>;
}

/// Q-matrix reprojection over the full projective transform.
///
/// The point buffer is reallocated only when the disparity map resolution
/// changes.  Invalid disparity samples produce points at infinity, which a
/// configured maximum depth later turns into NaN sentinels.
pub struct QReprojector {
    buf: Vec<f32>,
    width: u32,
    height: u32,
}

impl QReprojector {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

impl Default for QReprojector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor for QReprojector {
    fn reconstruct(&mut self, disparity: &ImagePlane<'_>, q: &[f32; 16]) -> Result<&[f32], Error> {
        if disparity.format != PixelFormat::Mono12 {
            return Err(Error::Reconstruction(format!(
                "disparity plane must be mono12, got {}",
                disparity.format
            )));
        }
        disparity
            .check()
            .map_err(|e| Error::Reconstruction(e.to_string()))?;

        if self.width != disparity.width || self.height != disparity.height {
            self.width = disparity.width;
            self.height = disparity.height;
            self.buf = vec![0.0; disparity.width as usize * disparity.height as usize * 4];
        }

        let width = disparity.width as usize;
        for y in 0..disparity.height as usize {
            let row = disparity.row(y);
            let out = &mut self.buf[y * width * 4..(y + 1) * width * 4];
            let yf = y as f32;

            for (x, (pair, point)) in row
                .chunks_exact(2)
                .zip(out.chunks_exact_mut(4))
                .enumerate()
            {
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                if raw >= INVALID_DISPARITY {
                    point[0] = f32::INFINITY;
                    point[1] = f32::INFINITY;
                    point[2] = f32::INFINITY;
                    point[3] = 0.0;
                    continue;
                }

                let xf = x as f32;
                let d = raw as f32 / SUBPIXEL_FACTOR;
                let w = q[12] * xf + q[13] * yf + q[14] * d + q[15];
                if w == 0.0 {
                    point[0] = f32::INFINITY;
                    point[1] = f32::INFINITY;
                    point[2] = f32::INFINITY;
                    point[3] = 0.0;
                    continue;
                }

                point[0] = (q[0] * xf + q[1] * yf + q[2] * d + q[3]) / w;
                point[1] = (q[4] * xf + q[5] * yf + q[6] * d + q[7]) / w;
                point[2] = (q[8] * xf + q[9] * yf + q[10] * d + q[11]) / w;
                point[3] = 0.0;
            }
        }

        Ok(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_q() -> [f32; 16] {
        let mut q = [0.0f32; 16];
        q[0] = 1.0;
        q[5] = 1.0;
        q[10] = 1.0;
        q[15] = 1.0;
        q
    }

    fn plane_from_samples(samples: &[u16], width: u32, height: u32) -> Vec<u8> {
        assert_eq!(samples.len() as u32, width * height);
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_identity_q_maps_pixels() {
        // disparity 32 raw = 2.0 pixels after sub-pixel division
        let data = plane_from_samples(&[32, 32, 32, 32, 32, 32], 3, 2);
        let plane = ImagePlane {
            format: PixelFormat::Mono12,
            width: 3,
            height: 2,
            stride: 6,
            data: &data,
        };

        let mut recon = QReprojector::new();
        let points = recon.reconstruct(&plane, &identity_q()).unwrap();
        assert_eq!(points.len(), 3 * 2 * 4);

        // pixel (2, 1) -> point index 5
        let p = &points[5 * 4..5 * 4 + 4];
        assert_eq!(p, &[2.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_invalid_disparity_goes_to_infinity() {
        let data = plane_from_samples(&[0x0fff], 1, 1);
        let plane = ImagePlane {
            format: PixelFormat::Mono12,
            width: 1,
            height: 1,
            stride: 2,
            data: &data,
        };

        let mut recon = QReprojector::new();
        let points = recon.reconstruct(&plane, &identity_q()).unwrap();
        assert!(points[0].is_infinite());
        assert!(points[2].is_infinite());
    }

    #[test]
    fn test_buffer_reused_for_same_resolution() {
        let data = plane_from_samples(&[16, 16, 16, 16], 2, 2);
        let plane = ImagePlane {
            format: PixelFormat::Mono12,
            width: 2,
            height: 2,
            stride: 4,
            data: &data,
        };

        let mut recon = QReprojector::new();
        let ptr = recon.reconstruct(&plane, &identity_q()).unwrap().as_ptr();
        let ptr2 = recon.reconstruct(&plane, &identity_q()).unwrap().as_ptr();
        assert_eq!(ptr, ptr2);
    }

    #[test]
    fn test_rejects_non_disparity_format() {
        let data = [0u8; 4];
        let plane = ImagePlane {
            format: PixelFormat::Mono8,
            width: 2,
            height: 2,
            stride: 2,
            data: &data,
        };

        let mut recon = QReprojector::new();
        assert!(matches!(
            recon.reconstruct(&plane, &identity_q()),
            Err(Error::Reconstruction(_))
        ));
    }
}
