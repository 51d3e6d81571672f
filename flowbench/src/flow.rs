//! # Dense optical flow

use crate::error::Result;
use nalgebra as na;
use opencv::core::{Mat, Point2f, Rect};
use opencv::prelude::*;

/// Parameters of the polynomial expansion (Farneback) flow estimator.
///
/// Both backends use the same values, so that their output stays comparable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FarnebackParams {
    /// Scale between two consecutive pyramid levels.
    pub pyr_scale: f64,
    /// Number of pyramid levels, including the initial image.
    pub levels: i32,
    /// Use the fast pyramid construction on the accelerator.
    pub fast_pyramids: bool,
    /// Averaging window size.
    pub win_size: i32,
    /// Iterations at each pyramid level.
    pub iterations: i32,
    /// Pixel neighborhood used for polynomial expansion.
    pub poly_n: i32,
    /// Gaussian sigma smoothing the derivatives of the expansion.
    pub poly_sigma: f64,
    pub flags: i32,
}

impl FarnebackParams {
    pub const DEFAULT: Self = Self {
        pyr_scale: 0.5,
        levels: 5,
        fast_pyramids: false,
        win_size: 15,
        iterations: 3,
        poly_n: 5,
        poly_sigma: 1.2,
        flags: 0,
    };
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-pixel displacement field between two frames.
///
/// Backed by a 2 channel 32-bit float matrix, where channel 0 is horizontal and channel 1 is
/// vertical motion in pixels.
#[derive(Default)]
pub struct FlowField {
    mat: Mat,
}

impl FlowField {
    pub fn from_mat(mat: Mat) -> Self {
        Self { mat }
    }

    /// Get width and height of the field.
    pub fn dim(&self) -> (usize, usize) {
        (self.mat.cols() as _, self.mat.rows() as _)
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    pub fn as_mat_mut(&mut self) -> &mut Mat {
        &mut self.mat
    }

    /// Get motion at coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate.
    /// * `y` - vertical coordinate.
    pub fn get_motion(&self, x: usize, y: usize) -> Result<na::Vector2<f32>> {
        let m: &Point2f = self.mat.at_2d(y as _, x as _)?;
        Ok(na::Vector2::new(m.x, m.y))
    }

    /// Average motion within `region`.
    ///
    /// An empty region averages to zero.
    pub fn mean_motion(&self, region: Rect) -> Result<na::Vector2<f32>> {
        let mut sum = na::Vector2::<f64>::zeros();
        let mut cnt = 0usize;

        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let m: &Point2f = self.mat.at_2d(y, x)?;
                sum += na::Vector2::new(m.x as f64, m.y as f64);
                cnt += 1;
            }
        }

        if cnt == 0 {
            return Ok(na::Vector2::zeros());
        }

        Ok((sum / cnt as f64).cast::<f32>())
    }

    /// Largest motion magnitude in the field.
    pub fn max_magnitude(&self) -> Result<f32> {
        let (w, h) = self.dim();
        let mut max = 0f32;
        for y in 0..h {
            for x in 0..w {
                max = max.max(self.get_motion(x, y)?.magnitude());
            }
        }
        Ok(max)
    }
}

/// Assert that two intensity frames can be compared.
///
/// Mismatching dimensions are a logic error in the caller, not a recoverable condition.
pub fn assert_same_dims(previous: (i32, i32), current: (i32, i32)) {
    assert_eq!(
        previous, current,
        "previous and current frames differ in size"
    );
}

/// Sequential Farneback estimator.
#[derive(Default)]
pub struct CpuFlowEstimator {
    params: FarnebackParams,
}

impl CpuFlowEstimator {
    pub fn new(params: FarnebackParams) -> Self {
        Self { params }
    }

    /// Estimate flow from `previous` to `current` grayscale frames.
    ///
    /// # Panics
    ///
    /// If the frames differ in size.
    pub fn estimate(&self, previous: &Mat, current: &Mat, flow: &mut FlowField) -> Result<()> {
        assert_same_dims(
            (previous.cols(), previous.rows()),
            (current.cols(), current.rows()),
        );

        let p = &self.params;

        opencv::video::calc_optical_flow_farneback(
            previous,
            current,
            &mut flow.mat,
            p.pyr_scale,
            p.levels,
            p.win_size,
            p.iterations,
            p.poly_n,
            p.poly_sigma,
            p.flags,
        )?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use opencv::core::{Size, BORDER_DEFAULT, CV_8UC1};
    use opencv::imgproc;
    use rand::prelude::*;

    /// Smooth random texture, good for tracking.
    pub fn texture(width: i32, height: i32, seed: u64) -> Mat {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut noise =
            Mat::new_rows_cols_with_default(height, width, CV_8UC1, Default::default()).unwrap();

        for y in 0..height {
            for x in 0..width {
                *noise.at_2d_mut::<u8>(y, x).unwrap() = rng.gen();
            }
        }

        let mut out = Mat::default();
        imgproc::gaussian_blur(&noise, &mut out, Size::new(7, 7), 1.5, 0.0, BORDER_DEFAULT)
            .unwrap();
        out
    }

    /// Crop `width x height` starting at `(ox, oy)` of a grayscale image.
    pub fn crop(src: &Mat, ox: i32, oy: i32, width: i32, height: i32) -> Mat {
        let mut out =
            Mat::new_rows_cols_with_default(height, width, CV_8UC1, Default::default()).unwrap();

        for y in 0..height {
            for x in 0..width {
                *out.at_2d_mut::<u8>(y, x).unwrap() = *src.at_2d::<u8>(y + oy, x + ox).unwrap();
            }
        }

        out
    }

    #[test]
    fn default_params() {
        let p = FarnebackParams::default();
        assert_eq!(p.pyr_scale, 0.5);
        assert_eq!(p.levels, 5);
        assert!(!p.fast_pyramids);
        assert_eq!(p.win_size, 15);
        assert_eq!(p.iterations, 3);
        assert_eq!(p.poly_n, 5);
        assert_eq!(p.poly_sigma, 1.2);
        assert_eq!(p.flags, 0);
    }

    #[test]
    fn translation_is_recovered() {
        let big = texture(192, 192, 1);
        let (dx, dy) = (3, -2);

        // The second frame sees the same content, moved by (dx, dy).
        let first = crop(&big, 32, 32, 128, 128);
        let second = crop(&big, 32 - dx, 32 - dy, 128, 128);

        let mut flow = FlowField::default();
        CpuFlowEstimator::default()
            .estimate(&first, &second, &mut flow)
            .unwrap();

        assert_eq!(flow.dim(), (128, 128));

        let mean = flow.mean_motion(Rect::new(24, 24, 80, 80)).unwrap();
        assert!((mean.x - dx as f32).abs() <= 0.5, "{mean:?}");
        assert!((mean.y - dy as f32).abs() <= 0.5, "{mean:?}");
    }

    #[test]
    fn static_frames_have_no_motion() {
        let frame = texture(96, 64, 2);

        let mut flow = FlowField::default();
        CpuFlowEstimator::default()
            .estimate(&frame, &frame, &mut flow)
            .unwrap();

        assert!(flow.max_magnitude().unwrap() < 0.01);
    }

    #[test]
    #[should_panic(expected = "differ in size")]
    fn mismatched_frames_panic() {
        let a = texture(32, 32, 3);
        let b = texture(48, 32, 3);
        let _ = CpuFlowEstimator::default().estimate(&a, &b, &mut FlowField::default());
    }
}
