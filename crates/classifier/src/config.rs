//! Pipeline configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML/YAML/JSON file, then `CLASSIFY_*` environment variables
//! (`__` separates nested keys; arrays are comma separated, e.g.
//! `CLASSIFY_NORMALIZATION__SCALE=0.02,0.02,0.02`).

use std::path::Path;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, Level};

use crate::ClassifyError;

/// What to do with images left over when input ends mid-batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingBatchPolicy {
    /// Discard silently
    Drop,
    /// Discard and warn about every dropped image
    Report,
    /// Repeat the last image to fill the batch and classify the real ones
    Pad,
}

impl TrailingBatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrailingBatchPolicy::Drop => "drop",
            TrailingBatchPolicy::Report => "report",
            TrailingBatchPolicy::Pad => "pad",
        }
    }
}

/// Per-channel normalization constants, BGR order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Channel means subtracted before scaling
    pub mean: [f32; 3],
    /// Channel scale factors
    pub scale: [f32; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            mean: [103.94, 116.78, 123.68],
            scale: [0.017, 0.017, 0.017],
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Accelerator device to open
    pub device_id: u32,

    /// Number of batch cycles a video run performs before stopping
    pub video_cycles: u32,

    /// Handling of a trailing partial batch in image mode
    pub trailing_batch: TrailingBatchPolicy,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    pub normalization: NormalizationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            video_cycles: 200,
            trailing_batch: TrailingBatchPolicy::Report,
            log_level: "info".to_string(),
            normalization: NormalizationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ClassifyError> {
        Self::load_with(path, Self::environment())
    }

    /// `CLASSIFY_*` variables, with the normalization arrays parsed as lists
    fn environment() -> Environment {
        Environment::with_prefix("CLASSIFY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("normalization.mean")
            .with_list_parse_key("normalization.scale")
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self, ClassifyError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ClassifyError> {
        let norm = &self.normalization;
        if norm.mean.iter().chain(norm.scale.iter()).any(|v| !v.is_finite()) {
            return Err(ClassifyError::InvalidConfig(
                "normalization constants must be finite".to_string(),
            ));
        }
        self.level()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn level(&self) -> Result<Level, ClassifyError> {
        self.log_level
            .parse()
            .map_err(|_| ClassifyError::InvalidConfig(format!("unknown log level {:?}", self.log_level)))
    }
}
