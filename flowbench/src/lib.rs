//! # Optical Flow Benchmarking Pipeline
//!
//! This library reads a video, estimates dense optical flow between every pair of consecutive
//! frames, renders the flow on top of the frames and writes the result into a new video. Every
//! stage of the per-frame loop is timed, so that the sequential CPU path can be compared against
//! the CUDA-accelerated path.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use flowbench::prelude::v1::*;
//! ```
//!
//! A complete run is a single call to the executor:
//!
//! ```no_run
//! use flowbench::prelude::v1::*;
//!
//! let request = ProcessRequest {
//!     input: "videos/clip.mp4".into(),
//!     pipeline: "cpu".into(),
//!     ..Default::default()
//! };
//!
//! match PipelineExecutor::execute_request(&request) {
//!     Response::Success(result) => println!("{}", result.stats.full_pipeline_fps.unwrap_or(0.0)),
//!     Response::Failure(err) => eprintln!("{}", err.error),
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod flow;
pub mod io;
pub mod pipeline;
pub mod preprocess;
pub mod stats;
pub mod visualize;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            config::{Device, Overlays, PostProcessing, ProcessRequest, Resolution},
            error::{PipelineError, Result},
            executor::{ErrorResult, PipelineExecutor, Response},
            flow::{FarnebackParams, FlowField},
            io::{FrameSink, FrameSource},
            pipeline::{create_pipeline, CpuPipeline, GpuPipeline, Pipeline, PipelineResult},
            stats::{PipelineStats, Stage, StageTimers},
        };
        pub use opencv::core::Mat;
    }
}
