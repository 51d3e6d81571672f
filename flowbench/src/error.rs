//! # Pipeline errors

use thiserror::Error;

/// Result type used throughout the pipeline.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Every way a pipeline invocation can fail.
///
/// Errors are raised once and surface at the executor boundary, where they are turned into a
/// uniform error response. Nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unrecognised post-processing mode, pipeline type, or malformed resolution.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The accelerated backend was requested, but no usable compute device exists.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
    /// Source or sink could not be opened, read from or written to.
    #[error("i/o error: {0}")]
    Io(String),
    /// A derived throughput metric has a zero denominator.
    #[error("cannot compute {metric}: no frames or no accumulated time")]
    MetricComputation { metric: &'static str },
    /// Numerical backend failure inside a processing stage.
    #[error("backend error: {0}")]
    Backend(#[from] opencv::Error),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}
