//! Stand-in for device buffers when built without the `cuda` feature.
//!
//! The type is uninhabited, thus allocation is the only operation that can ever run.

use crate::config::{Overlays, Resolution};
use crate::error::{PipelineError, Result};
use crate::flow::FarnebackParams;
use crate::visualize::Visualizer;
use opencv::core::Mat;

pub enum DeviceBuffers {}

impl DeviceBuffers {
    pub fn allocate(_: &FarnebackParams, _: Resolution, _: Overlays) -> Result<Self> {
        Err(PipelineError::unavailable(
            "flowbench was built without CUDA support (enable the `cuda` feature)",
        ))
    }

    pub fn preprocess(&mut self, _: &Mat) -> Result<()> {
        match *self {}
    }

    pub fn estimate(&mut self) -> Result<()> {
        match *self {}
    }

    pub fn render<'a>(&'a mut self, _: &'a mut Visualizer) -> Result<&'a Mat> {
        match *self {}
    }

    pub fn advance(&mut self) {
        match *self {}
    }
}
