//! # Frame sources and sinks

use crate::config::Resolution;
use crate::error::{PipelineError, Result};
use log::*;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Codec tag of the rendered video (H.264).
pub const OUTPUT_FOURCC: [char; 4] = ['a', 'v', 'c', '1'];

/// Sequential, forward-only frame reader.
pub trait FrameSource {
    /// Read the next frame into `frame`.
    ///
    /// Returns `Ok(true)` when a frame was read, and `Ok(false)` once the stream is exhausted.
    /// End of stream is not an error.
    fn read(&mut self, frame: &mut Mat) -> Result<bool>;

    /// Get the framerate of the stream.
    fn fps(&self) -> f64;

    /// Get the number of frames the container claims to have.
    ///
    /// This is only a hint. Some containers do not know it, in which case `None` is returned.
    fn frame_count(&self) -> Option<usize>;
}

/// Sequential frame writer.
pub trait FrameSink {
    /// Append a single frame to the output.
    fn write(&mut self, frame: &Mat) -> Result<()>;
}

/// Video container reader backed by OpenCV.
///
/// The capture is released when the source is dropped.
pub struct VideoFileSource {
    capture: VideoCapture,
    path: PathBuf,
    fps: f64,
    frame_count: Option<usize>,
}

impl VideoFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy();

        let io_err = |e: opencv::Error| {
            PipelineError::io(format!("unable to open {}: {}", path.display(), e.message))
        };

        let capture = VideoCapture::from_file(&name, CAP_ANY).map_err(io_err)?;

        if !capture.is_opened().map_err(io_err)? {
            return Err(PipelineError::io(format!(
                "unable to open {}",
                path.display()
            )));
        }

        let fps = capture.get(CAP_PROP_FPS).map_err(io_err)?;
        let frame_count = capture
            .get(CAP_PROP_FRAME_COUNT)
            .ok()
            .filter(|c| c.is_finite() && *c >= 0.0)
            .map(|c| c as usize);

        Ok(Self {
            capture,
            path: path.to_path_buf(),
            fps,
            frame_count,
        })
    }

}

impl FrameSource for VideoFileSource {
    fn read(&mut self, frame: &mut Mat) -> Result<bool> {
        let ok = self.capture.read(frame).map_err(|e| {
            PipelineError::io(format!("read from {} failed: {}", self.path.display(), e.message))
        })?;

        Ok(ok && frame.rows() > 0)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Video container writer backed by OpenCV.
///
/// The writer is finalised when the sink is dropped.
pub struct VideoFileSink {
    writer: VideoWriter,
    path: PathBuf,
    written: usize,
}

impl VideoFileSink {
    pub fn create(path: impl AsRef<Path>, fps: f64, resolution: Resolution) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy();

        let io_err = |e: opencv::Error| {
            PipelineError::io(format!(
                "unable to create {}: {}",
                path.display(),
                e.message
            ))
        };

        let [c1, c2, c3, c4] = OUTPUT_FOURCC;
        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4).map_err(io_err)?;
        let writer =
            VideoWriter::new(&name, fourcc, fps, resolution.size(), true).map_err(io_err)?;

        if !writer.is_opened().map_err(io_err)? {
            return Err(PipelineError::io(format!(
                "unable to create {}",
                path.display()
            )));
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame).map_err(|e| {
            PipelineError::io(format!("write to {} failed: {}", self.path.display(), e.message))
        })?;
        self.written += 1;
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.release() {
            warn!("Failed to finalise {}: {}", self.path.display(), e);
        }
    }
}

/// Frame source over frames held in memory.
#[derive(Default)]
pub struct MemorySource {
    frames: VecDeque<Mat>,
    fps: f64,
    frame_count: usize,
    reads: usize,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Mat>, fps: f64) -> Self {
        let frames: VecDeque<_> = frames.into_iter().collect();
        Self {
            frame_count: frames.len(),
            frames,
            fps,
            reads: 0,
        }
    }

    /// Number of `read` calls made so far, including the one that hit the end of the stream.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl FrameSource for MemorySource {
    fn read(&mut self, frame: &mut Mat) -> Result<bool> {
        self.reads += 1;
        match self.frames.pop_front() {
            Some(f) => {
                *frame = f;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.frame_count)
    }
}

/// Frame sink collecting copies of every written frame.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<Mat>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        let mut copy = Mat::default();
        frame.copy_to(&mut copy)?;
        self.frames.push(copy);
        Ok(())
    }
}
