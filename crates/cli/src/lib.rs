//! Batch Classifier - Command Line Front End
//!
//! Parses `classify <mode> <list> <model>`, loads the layered configuration,
//! builds the pipeline and prints one report line per classified image
//! followed by a per-stage timing summary.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use accel_runtime::Backend;
use clap::{Parser, ValueEnum};
use classifier::{
    ClassifyError, ClassifyNet, LabeledResult, PipelineConfig, PipelineDriver, TrailingBatch,
    TrailingBatchPolicy, VideoOutcome,
};
use frame_source::open_source;
use thiserror::Error;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Input kind named by the first positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// List file holds still image paths
    Image,
    /// List file holds one video source per model batch slot
    Video,
}

/// Command-line override for the trailing batch policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrailingArg {
    Drop,
    Report,
    Pad,
}

impl From<TrailingArg> for TrailingBatchPolicy {
    fn from(arg: TrailingArg) -> Self {
        match arg {
            TrailingArg::Drop => TrailingBatchPolicy::Drop,
            TrailingArg::Report => TrailingBatchPolicy::Report,
            TrailingArg::Pad => TrailingBatchPolicy::Pad,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "classify",
    version,
    about = "Run a fixed-batch classification network over images or video frames"
)]
pub struct Cli {
    /// Input kind
    #[arg(value_enum)]
    pub mode: Mode,

    /// File listing image paths or video source URIs, one per line
    pub list: PathBuf,

    /// Compiled model file
    pub model: PathBuf,

    /// Configuration file layered over the built-in defaults
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Accelerator device id
    #[arg(long = "device-id")]
    pub device_id: Option<u32>,

    /// Batch cycles performed in video mode
    #[arg(long = "cycles")]
    pub cycles: Option<u32>,

    /// Handling of a trailing partial batch in image mode
    #[arg(long = "trailing", value_enum)]
    pub trailing: Option<TrailingArg>,
}

impl Cli {
    /// Layer file and environment configuration, then apply command-line flags
    pub fn resolve_config(&self) -> Result<PipelineConfig, AppError> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(device_id) = self.device_id {
            config.device_id = device_id;
        }
        if let Some(cycles) = self.cycles {
            config.video_cycles = cycles;
        }
        if let Some(trailing) = self.trailing {
            config.trailing_batch = trailing.into();
        }
        Ok(config)
    }
}

/// Front end error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Cannot find input list file {0}")]
    MissingList(PathBuf),

    #[error("Cannot find valid model file {0}")]
    MissingModel(PathBuf),

    #[error("Video source count {sources} must equal the model batch size {batch}")]
    SourceCountMismatch { sources: usize, batch: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// What a completed run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Images reported
    pub classified: usize,
    /// Image mode: fate of the final partial batch
    pub trailing: Option<TrailingBatch>,
    /// Video mode: cycles completed and why the loop stopped
    pub video: Option<VideoOutcome>,
}

/// Initialize logging on stderr, keeping stdout for the report
pub fn init_logging(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Read a newline-delimited list, skipping blank lines
pub fn read_list(path: &Path) -> Result<Vec<String>, AppError> {
    if !path.is_file() {
        return Err(AppError::MissingList(path.to_path_buf()));
    }
    let entries = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    Ok(entries)
}

/// Run the pipeline described by `cli` and write the report to `out`
pub fn run<W: Write>(
    cli: &Cli,
    config: &PipelineConfig,
    backend: &dyn Backend,
    out: &mut W,
) -> Result<RunSummary, AppError> {
    let entries = read_list(&cli.list)?;
    if !cli.model.is_file() {
        return Err(AppError::MissingModel(cli.model.clone()));
    }

    let net = ClassifyNet::new(backend, &cli.model, config.device_id, &config.normalization)?;
    let mut driver = PipelineDriver::new(net, config.trailing_batch);

    let mut classified = 0;
    let mut write_error = None;
    let mut emit = |result: &LabeledResult| {
        classified += 1;
        if write_error.is_none() {
            if let Err(e) = writeln!(out, "{}", result) {
                write_error = Some(e);
            }
        }
    };

    let (trailing, video) = match cli.mode {
        Mode::Image => {
            info!("Classifying {} images", entries.len());
            driver.run_image_list(&entries, &mut emit)?;
            let trailing = driver.finish(&mut emit)?;
            (Some(trailing), None)
        }
        Mode::Video => {
            let batch = driver.batch_size();
            if entries.len() != batch {
                return Err(AppError::SourceCountMismatch {
                    sources: entries.len(),
                    batch,
                });
            }

            let mut sources: Vec<_> = entries
                .iter()
                .map(|uri| match open_source(uri) {
                    Ok(source) => Some(source),
                    Err(e) => {
                        error!("Failed to open video source {}: {}", uri, e);
                        None
                    }
                })
                .collect();

            let outcome = driver.run_video(&mut sources, config.video_cycles, &mut emit)?;
            (None, Some(outcome))
        }
    };

    if let Some(e) = write_error {
        return Err(e.into());
    }

    writeln!(out)?;
    writeln!(out, "Timing summary:")?;
    for stats in driver.profiler().summarize() {
        writeln!(out, "{}", stats)?;
    }
    driver.profiler_mut().clear();

    Ok(RunSummary {
        classified,
        trailing,
        video,
    })
}
