//! # Pipeline execution boundary
//!
//! Every failure raised while validating a request or running a pipeline surfaces here exactly
//! once, and is converted into a uniform [`ErrorResult`]. Nothing is retried, that decision belongs
//! to the caller.

use crate::config::ProcessRequest;
use crate::error::{PipelineError, Result};
use crate::pipeline::{create_pipeline, Pipeline, PipelineResult};
use log::*;
use serde::Serialize;
use std::path::Path;

/// Uniform failure description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResult {
    pub error: String,
}

impl From<PipelineError> for ErrorResult {
    fn from(e: PipelineError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

/// Outcome of a single invocation.
///
/// Serializes to either the full result, or `{"error": ...}`.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(PipelineResult),
    Failure(ErrorResult),
}

impl Response {
    /// Transport status paired with the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Failure(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<PipelineResult>> for Response {
    fn from(res: Result<PipelineResult>) -> Self {
        match res {
            Ok(result) => Self::Success(result),
            Err(e) => {
                error!("Pipeline failed: {}", e);
                Self::Failure(e.into())
            }
        }
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run `pipeline` once over `input`.
    pub fn execute(pipeline: &mut dyn Pipeline, input: &Path, output: &Path) -> Response {
        info!("Video for processing: {}", input.display());
        pipeline.process(input, output).into()
    }

    /// Validate `request`, and run the pipeline it selects.
    ///
    /// The request is fully validated before the source is opened.
    pub fn run(request: &ProcessRequest) -> Result<PipelineResult> {
        let (device, settings) = request.validate()?;

        info!("Video for processing: {}", request.input.display());
        debug!(
            "{} pipeline at {} with {} post-processing",
            device, settings.resolution, settings.post_processing
        );

        create_pipeline(device, settings).process(&request.input, &request.output_path())
    }

    pub fn execute_request(request: &ProcessRequest) -> Response {
        Self::run(request).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Device, PipelineSettings};

    fn request(resolution: &str, post_processing: &str, pipeline: &str) -> ProcessRequest {
        ProcessRequest {
            input: "/nonexistent/clip.mp4".into(),
            output: Some(std::env::temp_dir().join("flowbench_never_written.mp4")),
            resolution: resolution.into(),
            post_processing: post_processing.into(),
            pipeline: pipeline.into(),
        }
    }

    #[test]
    fn bad_mode_is_rejected_before_opening() {
        // The input does not exist, yet the configuration error wins.
        let res = PipelineExecutor::run(&request("800x600", "sparkles", "cpu"));
        assert!(matches!(res, Err(PipelineError::Configuration(_))));

        let res = PipelineExecutor::run(&request("800by600", "both", "cpu"));
        assert!(matches!(res, Err(PipelineError::Configuration(_))));

        let res = PipelineExecutor::run(&request("800x600", "both", "fpga"));
        assert!(matches!(res, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn failure_response() {
        let response = PipelineExecutor::execute_request(&request("800x600", "none", "cpu"));

        assert!(!response.is_success());
        assert_eq!(response.status(), 500);

        let json = serde_json::to_value(&response).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj["error"].as_str().unwrap().starts_with("i/o error"));
    }

    #[test]
    fn execute_converts_errors() {
        let settings = PipelineSettings::default();
        let mut pipeline = create_pipeline(Device::Cpu, settings);

        let response = PipelineExecutor::execute(
            pipeline.as_mut(),
            Path::new("/nonexistent/clip.mp4"),
            Path::new("/nonexistent/clip_processed.mp4"),
        );

        match response {
            Response::Failure(ErrorResult { error }) => assert!(error.contains("clip.mp4")),
            Response::Success(_) => panic!("missing input processed"),
        }
    }

    #[test]
    fn error_result_keeps_message() {
        let e: ErrorResult = PipelineError::unavailable("no devices").into();
        assert_eq!(e.error, "resource unavailable: no devices");
    }
}
