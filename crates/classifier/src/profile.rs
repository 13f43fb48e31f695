//! Stage latency profiling
//!
//! A [`Profiler`] is created by its owner and handed to the stages it times.
//! Lifecycle: create, record with `begin`/`end` (or `time`), `summarize`, `clear`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::warn;

/// Pipeline stages that are timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Decode,
    Preprocess,
    Infer,
    Postprocess,
    Overall,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Preprocess => "preprocess",
            Stage::Infer => "infer",
            Stage::Postprocess => "postprocess",
            Stage::Overall => "overall",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate timings of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageStats {
    pub stage: Stage,
    pub count: usize,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl StageStats {
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total.div_f64(self.count as f64)
        }
    }
}

impl fmt::Display for StageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "{:<12} count: {:>5}  avg: {:>9.3} ms  min: {:>9.3} ms  max: {:>9.3} ms  total: {:>10.3} ms",
            self.stage.as_str(),
            self.count,
            ms(self.average()),
            ms(self.min),
            ms(self.max),
            ms(self.total)
        )
    }
}

/// Collects per-stage durations
#[derive(Debug, Default)]
pub struct Profiler {
    open: HashMap<Stage, Instant>,
    samples: BTreeMap<Stage, Vec<Duration>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `stage`; restarts the marker if it was already open
    pub fn begin(&mut self, stage: Stage) {
        if self.open.insert(stage, Instant::now()).is_some() {
            warn!("Profiler stage {} restarted before it ended", stage);
        }
    }

    /// Stop timing `stage` and record the sample
    pub fn end(&mut self, stage: Stage) -> Option<Duration> {
        let Some(start) = self.open.remove(&stage) else {
            warn!("Profiler stage {} ended without begin", stage);
            return None;
        };
        let elapsed = start.elapsed();
        self.record(stage, elapsed);
        Some(elapsed)
    }

    /// Record an externally measured sample
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.samples.entry(stage).or_default().push(elapsed);
    }

    /// Time a closure as one sample of `stage`
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let output = f();
        self.record(stage, start.elapsed());
        output
    }

    /// Per-stage statistics in pipeline order
    pub fn summarize(&self) -> Vec<StageStats> {
        self.samples
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(&stage, samples)| StageStats {
                stage,
                count: samples.len(),
                total: samples.iter().sum(),
                min: samples.iter().copied().min().unwrap_or_default(),
                max: samples.iter().copied().max().unwrap_or_default(),
            })
            .collect()
    }

    /// Drop every sample and open marker
    pub fn clear(&mut self) {
        self.open.clear();
        self.samples.clear();
    }
}
