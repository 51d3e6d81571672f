//! # CUDA accelerated backend
//!
//! Resizing, color conversion, flow estimation and the polar transform of the heatmap run on the
//! device. Every device operation is synchronous from the pipeline's point of view. Device
//! buffers are allocated once per run, reused across frames, and freed when the run ends.

use super::{Orchestrator, Stages};
use crate::config::{Device, PipelineSettings, Resolution};
use crate::error::{PipelineError, Result};
use crate::flow::FarnebackParams;
use crate::visualize::Visualizer;
use log::*;
use opencv::core::{get_cuda_enabled_device_count, DeviceInfo, Mat};
use opencv::prelude::*;

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
use cuda::DeviceBuffers;

#[cfg(not(feature = "cuda"))]
mod unsupported;
#[cfg(not(feature = "cuda"))]
use unsupported::DeviceBuffers;

/// Basic information about a compute device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: i32,
    pub name: Option<String>,
    pub total_memory_mb: usize,
    pub version: (i32, i32),
}

/// Function enumerating available compute devices.
pub type DeviceProbe = fn() -> Result<Vec<DeviceSummary>>;

/// Enumerate CUDA devices visible to OpenCV.
///
/// Returns an empty list when OpenCV was built without CUDA.
pub fn cuda_devices() -> Result<Vec<DeviceSummary>> {
    let unavailable =
        |e: opencv::Error| PipelineError::unavailable(format!("CUDA query failed: {}", e.message));

    let count = get_cuda_enabled_device_count().map_err(unavailable)?;

    (0..count)
        .map(|id| {
            let device = DeviceInfo::new(id).map_err(unavailable)?;
            Ok(DeviceSummary {
                id,
                name: device.name().ok(),
                total_memory_mb: device.total_memory().map_err(unavailable)? / (1024 * 1024),
                version: (
                    device.major_version().map_err(unavailable)?,
                    device.minor_version().map_err(unavailable)?,
                ),
            })
        })
        .collect()
}

/// Per-frame work offloaded to a CUDA device.
pub struct CudaStages {
    resolution: Resolution,
    params: FarnebackParams,
    visualizer: Visualizer,
    probe: DeviceProbe,
    buffers: Option<DeviceBuffers>,
}

impl CudaStages {
    fn buffers(&mut self) -> Result<&mut DeviceBuffers> {
        self.buffers
            .as_mut()
            .ok_or_else(|| PipelineError::unavailable("device buffers are not allocated"))
    }
}

impl Stages for CudaStages {
    const DEVICE: Device = Device::Gpu;

    fn new(settings: &PipelineSettings) -> Self {
        Self {
            resolution: settings.resolution,
            params: FarnebackParams::default(),
            visualizer: Visualizer::new(settings.post_processing.into()),
            probe: cuda_devices,
            buffers: None,
        }
    }

    fn init(&mut self) -> Result<()> {
        // Release anything left over from a previous run first.
        self.buffers = None;

        let devices = (self.probe)()?;

        if devices.is_empty() {
            return Err(PipelineError::unavailable(
                "No GPU devices available. Please check your CUDA installation.",
            ));
        }

        info!("Total CUDA devices: {}", devices.len());

        for device in &devices {
            info!("GPU-ID: {}", device.id);
            info!("Name: {}", device.name.as_deref().unwrap_or("N/A"));
            info!("Memory: {} MB", device.total_memory_mb);
            info!("Version: {}.{}", device.version.0, device.version.1);
        }

        self.buffers = Some(DeviceBuffers::allocate(
            &self.params,
            self.resolution,
            self.visualizer.overlays(),
        )?);

        Ok(())
    }

    fn preprocess(&mut self, frame: &Mat) -> Result<()> {
        self.buffers()?.preprocess(frame)
    }

    fn estimate(&mut self) -> Result<()> {
        self.buffers()?.estimate()
    }

    fn render(&mut self) -> Result<&Mat> {
        let Self {
            buffers,
            visualizer,
            ..
        } = self;

        buffers
            .as_mut()
            .ok_or_else(|| PipelineError::unavailable("device buffers are not allocated"))?
            .render(visualizer)
    }

    fn advance(&mut self) {
        if let Some(buffers) = &mut self.buffers {
            buffers.advance();
        }
    }
}

impl Orchestrator<CudaStages> {
    /// Replace the function used to enumerate compute devices.
    pub fn with_device_probe(mut self, probe: DeviceProbe) -> Self {
        self.stages.probe = probe;
        self
    }
}
