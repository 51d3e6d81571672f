//! # Pipeline configuration
//!
//! Raw, user supplied values arrive as strings (from a config file, command line, or an upstream
//! service). They are parsed into the typed values here before any video is touched, so that a bad
//! request never opens a source.

use crate::error::{PipelineError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output frame size, used for both resizing and the output container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::configuration(format!(
                "resolution must be positive, got {width}x{height}"
            )));
        }

        if width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(PipelineError::configuration(format!(
                "resolution {width}x{height} is too large"
            )));
        }

        Ok(Self { width, height })
    }

    pub fn size(&self) -> opencv::core::Size {
        opencv::core::Size::new(self.width as _, self.height as _)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = PipelineError;

    /// Parse `WIDTHxHEIGHT`, e.g. `800x600`.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || PipelineError::configuration(format!("malformed resolution '{s}'"));

        let (w, h) = s
            .trim()
            .to_lowercase()
            .split_once('x')
            .map(|(w, h)| (w.trim().parse::<u32>(), h.trim().parse::<u32>()))
            .ok_or_else(malformed)?;

        Self::new(w.map_err(|_| malformed())?, h.map_err(|_| malformed())?)
    }
}

/// Which overlays get drawn on top of each output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostProcessing {
    None,
    Heatmap,
    Arrows,
    Both,
}

impl Default for PostProcessing {
    fn default() -> Self {
        Self::Both
    }
}

impl FromStr for PostProcessing {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "heatmap" => Ok(Self::Heatmap),
            "arrows" => Ok(Self::Arrows),
            "both" => Ok(Self::Both),
            _ => Err(PipelineError::configuration(format!(
                "unrecognised post-processing mode '{s}' (expected none, heatmap, arrows or both)"
            ))),
        }
    }
}

impl fmt::Display for PostProcessing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Heatmap => "heatmap",
            Self::Arrows => "arrows",
            Self::Both => "both",
        };
        f.write_str(name)
    }
}

/// Independent overlay toggles, derived once from [`PostProcessing`].
///
/// Both backends apply the heatmap first and the arrows second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Overlays {
    pub heatmap: bool,
    pub arrows: bool,
}

impl From<PostProcessing> for Overlays {
    fn from(mode: PostProcessing) -> Self {
        Self {
            heatmap: matches!(mode, PostProcessing::Heatmap | PostProcessing::Both),
            arrows: matches!(mode, PostProcessing::Arrows | PostProcessing::Both),
        }
    }
}

/// Compute backend a pipeline runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(PipelineError::configuration(format!(
                "invalid pipeline type '{s}' (expected cpu or gpu)"
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

/// Typed pipeline settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub resolution: Resolution,
    pub post_processing: PostProcessing,
}

/// A single, not yet validated, processing request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub resolution: String,
    pub post_processing: String,
    pub pipeline: String,
}

impl Default for ProcessRequest {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            resolution: Resolution::default().to_string(),
            post_processing: PostProcessing::default().to_string(),
            pipeline: Device::Gpu.to_string(),
        }
    }
}

impl ProcessRequest {
    /// Load request defaults from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("unable to open config {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("unable to parse config {}", path.display()))
    }

    /// Validate the request into typed values.
    pub fn validate(&self) -> Result<(Device, PipelineSettings)> {
        let post_processing = self.post_processing.parse()?;
        let resolution = self.resolution.parse()?;
        let device = self.pipeline.parse()?;

        Ok((
            device,
            PipelineSettings {
                resolution,
                post_processing,
            },
        ))
    }

    /// Where the rendered video gets written.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| processed_path(&self.input))
    }
}

/// Derive the output path for `input`: `clip.mp4` becomes `clip_processed.mp4`.
pub fn processed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_processed.mp4"))
}
