//! # Sequential backend

use super::Stages;
use crate::config::{Device, PipelineSettings, Resolution};
use crate::error::Result;
use crate::flow::{CpuFlowEstimator, FarnebackParams, FlowField};
use crate::preprocess;
use crate::visualize::Visualizer;
use log::*;
use opencv::core::Mat;

/// Per-frame work done entirely on the host.
pub struct CpuStages {
    resolution: Resolution,
    estimator: CpuFlowEstimator,
    visualizer: Visualizer,
    resized: Mat,
    previous: Mat,
    current: Mat,
    flow: FlowField,
}

impl Stages for CpuStages {
    const DEVICE: Device = Device::Cpu;

    fn new(settings: &PipelineSettings) -> Self {
        Self {
            resolution: settings.resolution,
            estimator: CpuFlowEstimator::new(FarnebackParams::default()),
            visualizer: Visualizer::new(settings.post_processing.into()),
            resized: Default::default(),
            previous: Default::default(),
            current: Default::default(),
            flow: Default::default(),
        }
    }

    fn init(&mut self) -> Result<()> {
        debug!(
            "CPU stages at {} with {:?}",
            self.resolution,
            self.visualizer.overlays()
        );
        Ok(())
    }

    fn preprocess(&mut self, frame: &Mat) -> Result<()> {
        preprocess::resize(frame, self.resolution, &mut self.resized)?;
        preprocess::to_intensity(&self.resized, &mut self.current)
    }

    fn estimate(&mut self) -> Result<()> {
        self.estimator
            .estimate(&self.previous, &self.current, &mut self.flow)
    }

    fn render(&mut self) -> Result<&Mat> {
        self.visualizer.render(&self.resized, &self.flow)
    }

    fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
    }
}
