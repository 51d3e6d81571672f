//! # Stage timing and throughput statistics

use crate::error::{PipelineError, Result};
use log::*;
use serde::{Serialize, Serializer};
use std::io::Write;
use std::time::{Duration, Instant};

/// Timed part of the per-frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Read,
    Preprocess,
    OpticalFlow,
    PostProcess,
    /// Whole iteration, spanning all other stages.
    Total,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Read,
        Stage::Preprocess,
        Stage::OpticalFlow,
        Stage::PostProcess,
        Stage::Total,
    ];

    /// Stages making up a single iteration.
    pub const PARTS: [Stage; 4] = [
        Stage::Read,
        Stage::Preprocess,
        Stage::OpticalFlow,
        Stage::PostProcess,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Preprocess => "preprocess",
            Stage::OpticalFlow => "optical-flow",
            Stage::PostProcess => "post-process",
            Stage::Total => "total",
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

/// Per-frame elapsed time samples of every stage.
///
/// Owned by a single pipeline run. Never shared between runs.
#[derive(Clone, Debug, Default)]
pub struct StageTimers {
    samples: [Vec<Duration>; 5],
}

impl StageTimers {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.samples[stage.idx()].push(elapsed);
    }

    /// Run `f`, and record its elapsed time against `stage`.
    ///
    /// The time is recorded regardless of whether `f` succeeds.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let ret = f();
        self.record(stage, start.elapsed());
        ret
    }

    pub fn samples(&self, stage: Stage) -> &[Duration] {
        &self.samples[stage.idx()]
    }

    /// Accumulated seconds spent in `stage`.
    pub fn seconds(&self, stage: Stage) -> f64 {
        self.samples(stage).iter().map(Duration::as_secs_f64).sum()
    }

    /// Total and average (in milliseconds) time of `stage`.
    pub fn summary(&self, stage: Stage) -> (f64, f64) {
        let times = self.samples(stage);
        let total = self.seconds(stage);
        let len = if times.is_empty() {
            1.0
        } else {
            times.len() as f64
        };
        (total, total * 1000.0 / len)
    }

    /// Number of fully timed iterations.
    pub fn frames(&self) -> usize {
        self.samples(Stage::Total).len()
    }

    /// Export per-frame samples in milliseconds, one row per frame.
    pub fn write_csv<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct Row {
            frame: usize,
            read: f64,
            preprocess: f64,
            #[serde(rename = "optical-flow")]
            optical_flow: f64,
            #[serde(rename = "post-process")]
            post_process: f64,
            total: f64,
        }

        let ms = |stage: Stage, frame: usize| {
            self.samples(stage)
                .get(frame)
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or_default()
        };

        let mut writer = csv::Writer::from_writer(writer);

        for frame in 0..self.frames() {
            writer.serialize(Row {
                frame,
                read: ms(Stage::Read, frame),
                preprocess: ms(Stage::Preprocess, frame),
                optical_flow: ms(Stage::OpticalFlow, frame),
                post_process: ms(Stage::PostProcess, frame),
                total: ms(Stage::Total, frame),
            })?;
        }

        writer.flush()?;

        Ok(())
    }
}

/// Frames per second achieved over `seconds`.
///
/// Fails instead of dividing by zero.
pub fn throughput(metric: &'static str, frames: usize, seconds: f64) -> Result<f64> {
    if frames == 0 || seconds <= 0.0 || !seconds.is_finite() {
        return Err(PipelineError::MetricComputation { metric });
    }

    Ok(frames as f64 / seconds)
}

/// Aggregated statistics of a single run.
///
/// Numeric values are the contract. They serialize as fixed 3 decimal strings, and metrics that
/// could not be computed serialize as `"unavailable"`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    #[serde(serialize_with = "fixed")]
    pub read: f64,
    #[serde(serialize_with = "fixed")]
    pub preprocess: f64,
    #[serde(rename = "optical-flow", serialize_with = "fixed")]
    pub optical_flow: f64,
    #[serde(rename = "post-process", serialize_with = "fixed")]
    pub post_process: f64,
    #[serde(serialize_with = "fixed")]
    pub total: f64,
    #[serde(rename = "video fps", serialize_with = "fixed_or_unavailable")]
    pub video_fps: Option<f64>,
    #[serde(rename = "optical-flow fps", serialize_with = "fixed_or_unavailable")]
    pub optical_flow_fps: Option<f64>,
    #[serde(rename = "full-pipeline fps", serialize_with = "fixed_or_unavailable")]
    pub full_pipeline_fps: Option<f64>,
}

impl PipelineStats {
    /// Aggregate `timers` of a run over a source running at `source_fps`.
    pub fn from_timers(timers: &StageTimers, source_fps: f64) -> Self {
        let frames = timers.frames();

        let guarded = |metric, stage| match throughput(metric, frames, timers.seconds(stage)) {
            Ok(fps) => Some(fps),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };

        Self {
            read: timers.seconds(Stage::Read),
            preprocess: timers.seconds(Stage::Preprocess),
            optical_flow: timers.seconds(Stage::OpticalFlow),
            post_process: timers.seconds(Stage::PostProcess),
            total: timers.seconds(Stage::Total),
            video_fps: Some(source_fps).filter(|f| f.is_finite() && *f > 0.0),
            optical_flow_fps: guarded("optical-flow fps", Stage::OpticalFlow),
            full_pipeline_fps: guarded("full-pipeline fps", Stage::Total),
        }
    }
}

fn fixed<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.3}", v))
}

fn fixed_or_unavailable<S: Serializer>(
    v: &Option<f64>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match v {
        Some(v) => fixed(v, s),
        None => s.serialize_str("unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timers(frames: u64) -> StageTimers {
        let mut timers = StageTimers::default();
        for _ in 0..frames {
            timers.record(Stage::Read, ms(1));
            timers.record(Stage::Preprocess, ms(2));
            timers.record(Stage::OpticalFlow, ms(20));
            timers.record(Stage::PostProcess, ms(2));
            timers.record(Stage::Total, ms(25));
        }
        timers
    }

    #[test]
    fn stage_names() {
        let names = Stage::ALL.iter().map(Stage::name).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["read", "preprocess", "optical-flow", "post-process", "total"]
        );
    }

    #[test]
    fn timer_sums() {
        let timers = timers(4);
        assert_eq!(timers.frames(), 4);
        assert_approx_eq!(timers.seconds(Stage::OpticalFlow), 0.08);

        let (total, avg_ms) = timers.summary(Stage::Total);
        assert_approx_eq!(total, 0.1);
        assert_approx_eq!(avg_ms, 25.0);

        assert_eq!(StageTimers::default().summary(Stage::Read), (0.0, 0.0));
    }

    #[test]
    fn time_records_sample() {
        let mut timers = StageTimers::default();
        let v = timers.time(Stage::Read, || 5);
        assert_eq!(v, 5);
        let res: Result<()> = timers.time(Stage::Read, || Err(PipelineError::io("x")));
        assert!(res.is_err());
        assert_eq!(timers.samples(Stage::Read).len(), 2);
        assert!(timers.samples(Stage::Total).is_empty());
    }

    #[test]
    fn throughput_is_guarded() {
        assert_approx_eq!(throughput("x", 10, 2.0).unwrap(), 5.0);
        assert!(matches!(
            throughput("x", 0, 2.0),
            Err(PipelineError::MetricComputation { metric: "x" })
        ));
        assert!(throughput("x", 10, 0.0).is_err());
    }

    #[test]
    fn derived_metrics() {
        let stats = PipelineStats::from_timers(&timers(4), 30.0);
        assert_approx_eq!(stats.optical_flow_fps.unwrap(), 50.0);
        assert_approx_eq!(stats.full_pipeline_fps.unwrap(), 40.0);
        assert_eq!(stats.video_fps, Some(30.0));
        assert_approx_eq!(stats.read, 0.004);
    }

    #[test]
    fn empty_run_has_unavailable_metrics() {
        let stats = PipelineStats::from_timers(&StageTimers::default(), 0.0);
        assert_eq!(stats.total, 0.0);
        assert_eq!(stats.video_fps, None);
        assert_eq!(stats.optical_flow_fps, None);
        assert_eq!(stats.full_pipeline_fps, None);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total"], "0.000");
        assert_eq!(json["optical-flow fps"], "unavailable");
        assert_eq!(json["full-pipeline fps"], "unavailable");
    }

    #[test]
    fn serialized_keys() {
        let json = serde_json::to_value(PipelineStats::from_timers(&timers(2), 25.0)).unwrap();
        let mut keys = json.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(
            keys,
            [
                "full-pipeline fps",
                "optical-flow",
                "optical-flow fps",
                "post-process",
                "preprocess",
                "read",
                "total",
                "video fps"
            ]
        );
        assert_eq!(json["optical-flow"], "0.040");
        assert_eq!(json["video fps"], "25.000");
    }

    #[test]
    fn csv_export() {
        let mut out = vec![];
        timers(2).write_csv(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "frame,read,preprocess,optical-flow,post-process,total"
        );
        let row = lines[1]
            .split(',')
            .map(|v| v.parse::<f64>().unwrap())
            .collect::<Vec<_>>();
        for (v, expected) in row.into_iter().zip([0.0, 1.0, 2.0, 20.0, 2.0, 25.0]) {
            assert_approx_eq!(v, expected);
        }
    }
}
