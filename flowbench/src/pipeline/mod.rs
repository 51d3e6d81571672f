//! # Frame processing pipelines
//!
//! A pipeline reads frames one by one, estimates flow between each frame and its predecessor,
//! renders the configured overlays and writes the result out. The loop and its timing are shared
//! by every backend, and only the per-frame work in [`Stages`] differs between them. This keeps
//! statistics of the sequential and accelerated variants directly comparable.

use crate::config::{Device, PipelineSettings, Resolution};
use crate::error::Result;
use crate::io::{FrameSink, FrameSource, VideoFileSink, VideoFileSource};
use crate::stats::{PipelineStats, Stage, StageTimers};
use log::*;
use opencv::core::Mat;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

pub mod cpu;
pub mod gpu;

pub use cpu::CpuStages;
pub use gpu::{CudaStages, DeviceSummary};

/// Sequential pipeline.
pub type CpuPipeline = Orchestrator<CpuStages>;
/// CUDA accelerated pipeline.
pub type GpuPipeline = Orchestrator<CudaStages>;

/// Outcome of a successful pipeline run.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineResult {
    pub device: Device,
    pub stats: PipelineStats,
    /// Identifier of the rendered video.
    pub video: String,
    /// Number of frames written to the output.
    pub frames: usize,
    pub resolution: Resolution,
    /// Raw per-frame samples the stats were aggregated from.
    #[serde(skip)]
    pub timers: StageTimers,
}

/// A video processing pipeline.
pub trait Pipeline {
    fn device(&self) -> Device;

    /// Process the whole video at `input`, and write the rendered video to `output`.
    ///
    /// Blocks until the video is fully processed, or an error occurs.
    fn process(&mut self, input: &Path, output: &Path) -> Result<PipelineResult>;
}

/// Backend specific per-frame work.
///
/// Implementors own the previous and current intensity buffers, and the last estimated flow.
pub trait Stages: Sized {
    const DEVICE: Device;

    fn new(settings: &PipelineSettings) -> Self;

    /// Validate and acquire backend resources.
    ///
    /// Called once per run, before the first frame is read.
    fn init(&mut self) -> Result<()>;

    /// Resize `frame`, and convert it into the current intensity buffer.
    fn preprocess(&mut self, frame: &Mat) -> Result<()>;

    /// Estimate flow from the previous to the current intensity buffer.
    fn estimate(&mut self) -> Result<()>;

    /// Render the resized frame with the configured overlays.
    fn render(&mut self) -> Result<&Mat>;

    /// Make the current intensity buffer the previous one.
    fn advance(&mut self);
}

/// Drives the read, preprocess, flow, visualise, write loop over any [`Stages`].
pub struct Orchestrator<S> {
    settings: PipelineSettings,
    stages: S,
}

impl<S: Stages> Orchestrator<S> {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            stages: S::new(&settings),
            settings,
        }
    }

    /// Run the pipeline over an already opened source and sink.
    ///
    /// The first frame only seeds the previous intensity buffer and is never written, thus a
    /// source of `N` frames produces `N - 1` output frames. The returned `video` identifier is
    /// left empty.
    pub fn process_stream(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<PipelineResult> {
        self.stages.init()?;

        // Fresh for every run.
        let mut timers = StageTimers::default();
        let mut frame = Mat::default();
        let mut read = 0usize;

        if source.read(&mut frame)? {
            read += 1;
            self.stages.preprocess(&frame)?;
            self.stages.advance();

            loop {
                let iteration = Instant::now();

                let read_start = Instant::now();
                if !source.read(&mut frame)? {
                    break;
                }
                timers.record(Stage::Read, read_start.elapsed());
                read += 1;

                let stages = &mut self.stages;

                timers.time(Stage::Preprocess, || stages.preprocess(&frame))?;
                timers.time(Stage::OpticalFlow, || stages.estimate())?;
                timers.time(Stage::PostProcess, || sink.write(stages.render()?))?;

                stages.advance();

                timers.record(Stage::Total, iteration.elapsed());
            }
        } else {
            info!("Source video is empty");
        }

        let frames = timers.frames();

        if let Some(expected) = ended_early(read, source.frame_count()) {
            warn!("Source ended after {} of {} frames", read, expected);
        }

        let stats = PipelineStats::from_timers(&timers, source.fps());

        info!(
            "{} pipeline wrote {} frames in {:.3} s",
            S::DEVICE,
            frames,
            stats.total
        );

        Ok(PipelineResult {
            device: S::DEVICE,
            stats,
            video: String::new(),
            frames,
            resolution: self.settings.resolution,
            timers,
        })
    }
}

impl<S: Stages> Pipeline for Orchestrator<S> {
    fn device(&self) -> Device {
        S::DEVICE
    }

    fn process(&mut self, input: &Path, output: &Path) -> Result<PipelineResult> {
        info!("{} pipeline", S::DEVICE);

        let mut source = VideoFileSource::open(input)?;

        info!(
            "Source video has {} frames with {} rate.",
            source
                .frame_count()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".into()),
            source.fps()
        );

        let mut sink = VideoFileSink::create(output, source.fps(), self.settings.resolution)?;

        let mut result = self.process_stream(&mut source, &mut sink)?;
        result.video = video_id(output);

        debug!("{} frames written to {}", sink.written(), sink.path().display());

        Ok(result)
    }
}

/// Frame count the source claimed, if fewer than that were read.
fn ended_early(read: usize, expected: Option<usize>) -> Option<usize> {
    expected.filter(|&n| read < n)
}

/// Identifier of a rendered video, rooted at `/`.
fn video_id(output: &Path) -> String {
    if output.has_root() {
        output.display().to_string()
    } else {
        format!("/{}", output.display())
    }
}

/// Create a pipeline for `device`.
pub fn create_pipeline(device: Device, settings: PipelineSettings) -> Box<dyn Pipeline> {
    match device {
        Device::Cpu => Box::new(CpuPipeline::new(settings)),
        Device::Gpu => Box::new(GpuPipeline::new(settings)),
    }
}
