//! Fixed-Batch Image Classification Pipeline
//!
//! Drives a compiled classification network over a stream of images:
//! - Model-shape-driven buffer allocation ([`ModelDescriptor`], [`BatchInferenceEngine`])
//! - Resize and per-channel affine normalization into the device layout ([`Preprocessor`])
//! - Batched, blocking inference dispatch
//! - Top-1 extraction per image ([`extract`])
//! - Batch accumulation and video capture loops ([`PipelineDriver`])

pub mod config;
pub mod descriptor;
pub mod driver;
pub mod engine;
pub mod extract;
pub mod net;
pub mod normalize;
pub mod preprocess;
pub mod profile;

pub use config::{NormalizationConfig, PipelineConfig, TrailingBatchPolicy};
pub use descriptor::ModelDescriptor;
pub use driver::{DriverState, LabeledResult, PipelineDriver, StopReason, TrailingBatch, VideoOutcome};
pub use engine::{BatchInferenceEngine, ScoreBuffer};
pub use extract::ClassificationResult;
pub use net::ClassifyNet;
pub use normalize::NormalizationParams;
pub use preprocess::Preprocessor;
pub use profile::{Profiler, Stage, StageStats};

use accel_runtime::RuntimeError;
use frame_source::SourceError;
use thiserror::Error;

/// Classification pipeline error types
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Unsupported model: {0}")]
    Model(String),

    #[error("Batch size mismatch: model expects {expected} images, got {actual}")]
    BatchSize { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
