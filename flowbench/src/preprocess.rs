//! # Frame preprocessing
//!
//! Resizing to the output resolution, and conversion to the single channel intensity image that
//! flow estimation runs on. Both functions write into caller owned buffers so that they can be
//! reused across frames.

use crate::config::Resolution;
use crate::error::Result;
use opencv::core::Mat;
use opencv::imgproc;

/// Interpolation used for resizing frames.
pub const INTERPOLATION: i32 = imgproc::INTER_LINEAR;

/// Resize a BGR frame to `resolution`.
pub fn resize(frame: &Mat, resolution: Resolution, out: &mut Mat) -> Result<()> {
    imgproc::resize(frame, out, resolution.size(), 0.0, 0.0, INTERPOLATION)?;
    Ok(())
}

/// Convert a BGR frame to luma-weighted grayscale.
pub fn to_intensity(frame: &Mat, out: &mut Mat) -> Result<()> {
    imgproc::cvt_color(frame, out, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1, CV_8UC3};
    use opencv::prelude::*;

    #[test]
    fn resize_and_convert() {
        let frame =
            Mat::new_rows_cols_with_default(90, 160, CV_8UC3, Scalar::new(255.0, 0.0, 0.0, 0.0))
                .unwrap();

        let mut resized = Mat::default();
        resize(&frame, Resolution::new(64, 48).unwrap(), &mut resized).unwrap();
        assert_eq!((resized.cols(), resized.rows()), (64, 48));
        assert_eq!(resized.typ(), CV_8UC3);

        let mut gray = Mat::default();
        to_intensity(&resized, &mut gray).unwrap();
        assert_eq!((gray.cols(), gray.rows()), (64, 48));
        assert_eq!(gray.typ(), CV_8UC1);

        // Pure blue has a luma weight of 0.114.
        let v = *gray.at_2d::<u8>(10, 10).unwrap();
        assert!((28..=30).contains(&v), "{v}");
    }
}
