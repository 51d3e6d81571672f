//! # Flow visualisation
//!
//! Two overlays are available. The heatmap encodes flow direction as hue and flow magnitude as
//! brightness, replacing the frame. The arrow field samples flow on a regular grid and draws it on
//! top of whatever is below. When both are enabled, arrows are always drawn over the heatmap.

use crate::config::Overlays;
use crate::error::Result;
use crate::flow::FlowField;
use nalgebra as na;
use opencv::core::*;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::types::VectorOfMat;

/// Distance between arrow samples, in pixels.
pub const ARROW_STRIDE: usize = 32;
/// Fraction of the arrow length taken by its head.
pub const ARROW_TIP_LENGTH: f64 = 0.5;
pub const ARROW_THICKNESS: i32 = 1;

/// Arrow colour (green, in BGR order).
pub fn arrow_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

/// Maps degrees in `[0, 360)` to a value, which scaled by 255 lands on the 8-bit hue range
/// `[0, 180)`.
const HUE_SCALE: f64 = (1.0 / 360.0) * (180.0 / 255.0);

/// Intermediate buffers of the heatmap path, reused across frames.
#[derive(Default)]
pub struct HeatmapBuffers {
    magnitude: Mat,
    angle: Mat,
    normalized: Mat,
    hue: Mat,
    saturation: Mat,
    hsv: Mat,
    hsv_8u: Mat,
}

impl HeatmapBuffers {
    /// Compute polar form of `flow`, with magnitude min-max normalised to `[0, 1]`.
    fn polar(&mut self, flow: &FlowField) -> Result<()> {
        let mut flow_split = VectorOfMat::new();
        flow_split.push(Mat::default());
        flow_split.push(Mat::default());
        split(flow.as_mat(), &mut flow_split)?;

        cart_to_polar(
            &flow_split.get(0)?,
            &flow_split.get(1)?,
            &mut self.magnitude,
            &mut self.angle,
            true,
        )?;

        normalize(
            &self.magnitude,
            &mut self.normalized,
            0.0,
            1.0,
            NORM_MINMAX,
            -1,
            &no_array(),
        )?;

        Ok(())
    }

    /// Encode direction and normalised magnitude to a BGR image.
    ///
    /// # Arguments
    ///
    /// * `normalized` - flow magnitude in `[0, 1]`, 32-bit float.
    /// * `angle` - flow direction in degrees, 32-bit float.
    /// * `out` - output 8-bit BGR image.
    pub fn encode(&mut self, normalized: &Mat, angle: &Mat, out: &mut Mat) -> Result<()> {
        angle.convert_to(&mut self.hue, CV_32F, HUE_SCALE, 0.0)?;

        let sz = angle.size()?;
        if self.saturation.size()? != sz || self.saturation.typ() != CV_32F {
            self.saturation = Mat::ones_size(sz, CV_32F)?.to_mat()?;
        }

        let mut hsv_split = VectorOfMat::new();
        hsv_split.push(self.hue.clone());
        hsv_split.push(self.saturation.clone());
        hsv_split.push(normalized.clone());
        merge(&hsv_split, &mut self.hsv)?;

        self.hsv.convert_to(&mut self.hsv_8u, CV_8U, 255.0, 0.0)?;
        imgproc::cvt_color(&self.hsv_8u, out, imgproc::COLOR_HSV2BGR, 0)?;

        Ok(())
    }

    /// Render the heatmap of `flow` on the host.
    pub fn render(&mut self, flow: &FlowField, out: &mut Mat) -> Result<()> {
        self.polar(flow)?;
        let normalized = std::mem::take(&mut self.normalized);
        let angle = std::mem::take(&mut self.angle);
        let res = self.encode(&normalized, &angle, out);
        self.normalized = normalized;
        self.angle = angle;
        res
    }
}

/// Iterate arrow sample points of a `width x height` frame.
///
/// Points start at the origin and step by [`ARROW_STRIDE`] on both axes. Every yielded point is
/// inside the frame.
pub fn arrow_grid(width: usize, height: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..height)
        .step_by(ARROW_STRIDE)
        .flat_map(move |y| (0..width).step_by(ARROW_STRIDE).map(move |x| (x, y)))
}

/// Compute start and end points of every arrow.
pub fn arrow_segments(flow: &FlowField) -> Result<Vec<(na::Point2<i32>, na::Point2<i32>)>> {
    let (width, height) = flow.dim();

    arrow_grid(width, height)
        .map(|(x, y)| {
            let motion = flow.get_motion(x, y)?;
            let start = na::Point2::new(x as f32, y as f32);
            let end = start + motion;
            Ok((
                start.map(|v| v as i32),
                end.map(|v| v.round() as i32),
            ))
        })
        .collect()
}

/// Draw the arrow field of `flow` onto `canvas`.
pub fn draw_arrows(canvas: &mut Mat, flow: &FlowField) -> Result<()> {
    for (start, end) in arrow_segments(flow)? {
        imgproc::arrowed_line(
            canvas,
            Point::new(start.x, start.y),
            Point::new(end.x, end.y),
            arrow_color(),
            ARROW_THICKNESS,
            imgproc::LINE_8,
            0,
            ARROW_TIP_LENGTH,
        )?;
    }

    Ok(())
}

/// Composes the configured overlays on top of resized frames.
pub struct Visualizer {
    overlays: Overlays,
    heatmap_buffers: HeatmapBuffers,
    heatmap: Mat,
    canvas: Mat,
}

impl Visualizer {
    pub fn new(overlays: Overlays) -> Self {
        Self {
            overlays,
            heatmap_buffers: Default::default(),
            heatmap: Default::default(),
            canvas: Default::default(),
        }
    }

    pub fn overlays(&self) -> Overlays {
        self.overlays
    }

    /// Render `base` with overlays computed from `flow` on the host.
    pub fn render<'a>(&'a mut self, base: &'a Mat, flow: &FlowField) -> Result<&'a Mat> {
        if self.overlays.heatmap {
            self.heatmap_buffers.render(flow, &mut self.heatmap)?;
        }

        self.compose(base, flow)
    }

    /// Render `base` with the heatmap built from precomputed polar coordinates.
    ///
    /// `flow` is only read when arrows are enabled.
    pub fn render_polar<'a>(
        &'a mut self,
        base: &'a Mat,
        normalized: &Mat,
        angle: &Mat,
        flow: &FlowField,
    ) -> Result<&'a Mat> {
        if self.overlays.heatmap {
            self.heatmap_buffers
                .encode(normalized, angle, &mut self.heatmap)?;
        }

        self.compose(base, flow)
    }

    fn compose<'a>(&'a mut self, base: &'a Mat, flow: &FlowField) -> Result<&'a Mat> {
        let below = if self.overlays.heatmap {
            &self.heatmap
        } else {
            base
        };

        if !self.overlays.arrows {
            return Ok(below);
        }

        below.copy_to(&mut self.canvas)?;
        draw_arrows(&mut self.canvas, flow)?;

        Ok(&self.canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostProcessing;

    /// Field where the left half moves by `left`, and the right half is still.
    fn half_moving(width: i32, height: i32, left: (f32, f32)) -> FlowField {
        let mut mat =
            Mat::new_rows_cols_with_default(height, width, CV_32FC2, Scalar::all(0.0)).unwrap();

        for y in 0..height {
            for x in 0..width / 2 {
                *mat.at_2d_mut::<Point2f>(y, x).unwrap() = Point2f::new(left.0, left.1);
            }
        }

        FlowField::from_mat(mat)
    }

    fn bgr(img: &Mat, x: i32, y: i32) -> [u8; 3] {
        let px = img.at_2d::<Vec3b>(y, x).unwrap();
        [px[0], px[1], px[2]]
    }

    fn base(width: i32, height: i32) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(77.0)).unwrap()
    }

    #[test]
    fn grid_stays_in_bounds() {
        for (w, h) in [(800, 600), (64, 64), (65, 33), (31, 31), (1, 1), (0, 0), (0, 40)] {
            let points = arrow_grid(w, h).collect::<Vec<_>>();
            let expected = ((w + ARROW_STRIDE - 1) / ARROW_STRIDE)
                * ((h + ARROW_STRIDE - 1) / ARROW_STRIDE);
            assert_eq!(points.len(), expected, "{w}x{h}");
            assert!(points.iter().all(|&(x, y)| x < w && y < h));
            assert!(points.iter().all(|&(x, y)| x % 32 == 0 && y % 32 == 0));
        }

        assert_eq!(arrow_grid(800, 600).count(), 25 * 19);
    }

    #[test]
    fn segments_follow_flow() {
        let flow = half_moving(64, 64, (10.4, -2.6));
        let segments = arrow_segments(&flow).unwrap();

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], (na::Point2::new(0, 0), na::Point2::new(10, -3)));
        assert_eq!(segments[1], (na::Point2::new(32, 0), na::Point2::new(32, 0)));
        assert_eq!(segments[2], (na::Point2::new(0, 32), na::Point2::new(10, 29)));
    }

    #[test]
    fn static_flow_has_zero_length_arrows() {
        let flow = half_moving(100, 70, (0.0, 0.0));
        for (start, end) in arrow_segments(&flow).unwrap() {
            assert_eq!(start, end);
        }
    }

    #[test]
    fn static_flow_heatmap_is_dark() {
        let flow = half_moving(48, 32, (0.0, 0.0));
        let mut out = Mat::default();
        HeatmapBuffers::default().render(&flow, &mut out).unwrap();

        assert_eq!((out.cols(), out.rows()), (48, 32));
        assert_eq!(out.typ(), CV_8UC3);

        for y in 0..32 {
            for x in 0..48 {
                assert_eq!(bgr(&out, x, y), [0, 0, 0]);
            }
        }
    }

    #[test]
    fn heatmap_encodes_direction_and_magnitude() {
        let mut out = Mat::default();

        // Rightwards motion is hue 0 (red) at full brightness.
        HeatmapBuffers::default()
            .render(&half_moving(64, 16, (2.0, 0.0)), &mut out)
            .unwrap();
        assert_eq!(bgr(&out, 5, 5), [0, 0, 255]);
        assert_eq!(bgr(&out, 50, 5), [0, 0, 0]);

        // Downwards motion is 90 degrees on the hue wheel.
        HeatmapBuffers::default()
            .render(&half_moving(64, 16, (0.0, 2.0)), &mut out)
            .unwrap();
        let [b, g, r] = bgr(&out, 5, 5);
        assert_eq!((b, g), (0, 255));
        assert!((126..=129).contains(&r), "{r}");
    }

    #[test]
    fn none_passes_base_through() {
        let frame = base(64, 64);
        let flow = half_moving(64, 64, (10.0, 0.0));
        let mut vis = Visualizer::new(PostProcessing::None.into());

        let out = vis.render(&frame, &flow).unwrap();
        assert!(std::ptr::eq(out, &frame));
    }

    #[test]
    fn arrows_draw_over_base() {
        let frame = base(64, 64);
        let flow = half_moving(64, 64, (10.0, 0.0));
        let mut vis = Visualizer::new(PostProcessing::Arrows.into());

        let out = vis.render(&frame, &flow).unwrap();
        assert_eq!(bgr(out, 5, 0), [0, 255, 0]);
        assert_eq!(bgr(out, 5, 16), [77, 77, 77]);
        // The source frame is left untouched.
        assert_eq!(bgr(&frame, 5, 0), [77, 77, 77]);
    }

    #[test]
    fn both_draws_arrows_over_heatmap() {
        let frame = base(64, 64);
        let flow = half_moving(64, 64, (10.0, 0.0));

        let mut heatmap_only = Visualizer::new(PostProcessing::Heatmap.into());
        let out = heatmap_only.render(&frame, &flow).unwrap();
        assert_eq!(bgr(out, 5, 0), [0, 0, 255]);
        assert_eq!(bgr(out, 48, 16), [0, 0, 0]);

        let mut both = Visualizer::new(PostProcessing::Both.into());
        let out = both.render(&frame, &flow).unwrap();
        assert_eq!(bgr(out, 5, 0), [0, 255, 0]);
        assert_eq!(bgr(out, 5, 16), [0, 0, 255]);
        assert_eq!(bgr(out, 48, 16), [0, 0, 0]);
    }
}
