//! Backend and network traits

use std::path::Path;

use crate::{BatchTensor, RuntimeError};

/// Element type of the network input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit float input
    Float32,
    /// Signed 8-bit quantized input
    Int8,
}

impl DataType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float32 => "fp32",
            DataType::Int8 => "int8",
        }
    }
}

/// Metadata of a loaded network
#[derive(Debug, Clone, PartialEq)]
pub struct NetInfo {
    /// Network name
    pub name: String,
    /// Input element type
    pub input_dtype: DataType,
    /// Input shape, `[batch, channel, height, width]` for image models
    pub input_shape: Vec<usize>,
    /// Output shape, `[batch, classes, ...]` for classifiers
    pub output_shape: Vec<usize>,
    /// Multiplier mapping normalized floats onto the quantized input range
    /// (1.0 for float models)
    pub input_scale: f32,
    /// Quantized value that represents real zero (0 for float and
    /// symmetric models)
    pub input_zero_point: i32,
}

impl NetInfo {
    /// Total number of output elements
    pub fn output_count(&self) -> usize {
        self.output_shape.iter().product()
    }
}

/// A device runtime able to load compiled models
pub trait Backend {
    /// Acquire `device_id` and load the model at `model_path`
    fn open(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn Network>, RuntimeError>;
}

/// A loaded network bound to a device.
///
/// Device resources are released when the network is dropped.
pub trait Network {
    /// Network metadata
    fn info(&self) -> &NetInfo;

    /// Run one batch and write `output_count()` scores into `output`.
    /// Blocks until the device finishes.
    fn execute(&mut self, input: &BatchTensor, output: &mut [f32]) -> Result<(), RuntimeError>;
}
