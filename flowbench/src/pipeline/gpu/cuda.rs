use crate::config::{Overlays, Resolution};
use crate::error::Result;
use crate::flow::{assert_same_dims, FarnebackParams, FlowField};
use crate::preprocess::INTERPOLATION;
use crate::visualize::Visualizer;
use opencv::core::{no_array, GpuMat, Mat, Ptr, Stream, NORM_MINMAX};
use opencv::cudaoptflow::CUDA_FarnebackOpticalFlow;
use opencv::prelude::*;
use opencv::types::VectorOfGpuMat;
use opencv::{cudaarithm, cudaimgproc, cudawarping, imgproc};

/// Device side buffers of a single run.
pub struct DeviceBuffers {
    resolution: Resolution,
    overlays: Overlays,
    stream: Stream,
    farneback: Ptr<dyn CUDA_FarnebackOpticalFlow>,
    upload: GpuMat,
    resized: GpuMat,
    previous: GpuMat,
    current: GpuMat,
    flow: GpuMat,
    flow_xy: VectorOfGpuMat,
    magnitude: GpuMat,
    angle: GpuMat,
    normalized: GpuMat,
    host_resized: Mat,
    host_normalized: Mat,
    host_angle: Mat,
    host_flow: FlowField,
}

impl DeviceBuffers {
    pub fn allocate(
        params: &FarnebackParams,
        resolution: Resolution,
        overlays: Overlays,
    ) -> Result<Self> {
        let farneback = <dyn CUDA_FarnebackOpticalFlow>::create(
            params.levels,
            params.pyr_scale,
            params.fast_pyramids,
            params.win_size,
            params.iterations,
            params.poly_n,
            params.poly_sigma,
            params.flags,
        )?;

        let mut flow_xy = VectorOfGpuMat::new();
        flow_xy.push(GpuMat::default()?);
        flow_xy.push(GpuMat::default()?);

        Ok(Self {
            resolution,
            overlays,
            stream: Stream::default()?,
            farneback,
            upload: GpuMat::default()?,
            resized: GpuMat::default()?,
            previous: GpuMat::default()?,
            current: GpuMat::default()?,
            flow: GpuMat::default()?,
            flow_xy,
            magnitude: GpuMat::default()?,
            angle: GpuMat::default()?,
            normalized: GpuMat::default()?,
            host_resized: Mat::default(),
            host_normalized: Mat::default(),
            host_angle: Mat::default(),
            host_flow: FlowField::default(),
        })
    }

    pub fn preprocess(&mut self, frame: &Mat) -> Result<()> {
        self.upload.upload(frame)?;

        cudawarping::resize(
            &self.upload,
            &mut self.resized,
            self.resolution.size(),
            0.0,
            0.0,
            INTERPOLATION,
            &mut self.stream,
        )?;

        cudaimgproc::cvt_color(
            &self.resized,
            &mut self.current,
            imgproc::COLOR_BGR2GRAY,
            0,
            &mut self.stream,
        )?;

        self.stream.wait_for_completion()?;

        Ok(())
    }

    pub fn estimate(&mut self) -> Result<()> {
        let dims = |m: &GpuMat| (m.cols(), m.rows());
        assert_same_dims(dims(&self.previous), dims(&self.current));

        self.farneback.calc(
            &self.previous,
            &self.current,
            &mut self.flow,
            &mut self.stream,
        )?;

        self.stream.wait_for_completion()?;

        Ok(())
    }

    pub fn render<'a>(&'a mut self, visualizer: &'a mut Visualizer) -> Result<&'a Mat> {
        self.resized.download(&mut self.host_resized)?;

        if self.overlays.heatmap {
            cudaarithm::split(&self.flow, &mut self.flow_xy, &mut self.stream)?;

            cudaarithm::cart_to_polar(
                &self.flow_xy.get(0)?,
                &self.flow_xy.get(1)?,
                &mut self.magnitude,
                &mut self.angle,
                true,
                &mut self.stream,
            )?;

            cudaarithm::normalize(
                &self.magnitude,
                &mut self.normalized,
                0.0,
                1.0,
                NORM_MINMAX,
                -1,
                &no_array(),
                &mut self.stream,
            )?;

            self.stream.wait_for_completion()?;

            self.normalized.download(&mut self.host_normalized)?;
            self.angle.download(&mut self.host_angle)?;
        }

        if self.overlays.arrows {
            self.flow.download(self.host_flow.as_mat_mut())?;
        }

        visualizer.render_polar(
            &self.host_resized,
            &self.host_normalized,
            &self.host_angle,
            &self.host_flow,
        )
    }

    pub fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
    }
}
