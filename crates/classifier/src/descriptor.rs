//! Model metadata fixed at load time

use accel_runtime::{DataType, NetInfo};

use crate::ClassifyError;

/// Channel count of every supported model
pub const CHANNELS: usize = 3;

/// Shape and numeric contract of a loaded classification network
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Network name
    pub name: String,
    /// Images per inference call
    pub batch_size: usize,
    pub input_height: usize,
    pub input_width: usize,
    /// Always [`CHANNELS`]
    pub channels: usize,
    /// Scores per image
    pub class_count: usize,
    /// Input tensor is signed 8-bit
    pub is_quantized: bool,
    /// Quantization multiplier, 1.0 for float models
    pub input_scale: f32,
    /// Quantized value of real zero, 0 for float models
    pub input_zero_point: i32,
}

impl ModelDescriptor {
    /// Validate network metadata and derive the descriptor
    pub fn from_info(info: &NetInfo) -> Result<Self, ClassifyError> {
        let [batch_size, channels, input_height, input_width] = match info.input_shape[..] {
            [n, c, h, w] => [n, c, h, w],
            _ => {
                return Err(ClassifyError::Model(format!(
                    "input must be [batch, channel, height, width], got {:?}",
                    info.input_shape
                )))
            }
        };

        if channels != CHANNELS {
            return Err(ClassifyError::Model(format!(
                "expected {} input channels, got {}",
                CHANNELS, channels
            )));
        }
        if batch_size == 0 || input_height == 0 || input_width == 0 {
            return Err(ClassifyError::Model(format!(
                "input shape {:?} has a zero dimension",
                info.input_shape
            )));
        }

        let class_count = match info.output_shape[..] {
            [n, classes, ..] if n == batch_size => classes,
            _ => {
                return Err(ClassifyError::Model(format!(
                    "output must be [{}, classes], got {:?}",
                    batch_size, info.output_shape
                )))
            }
        };
        if class_count == 0 || info.output_count() != batch_size * class_count {
            return Err(ClassifyError::Model(format!(
                "output shape {:?} does not hold {} score rows",
                info.output_shape, batch_size
            )));
        }

        if !(info.input_scale.is_finite() && info.input_scale > 0.0) {
            return Err(ClassifyError::Model(format!(
                "invalid input scale {}",
                info.input_scale
            )));
        }

        let is_quantized = info.input_dtype == DataType::Int8;
        if !is_quantized && info.input_zero_point != 0 {
            return Err(ClassifyError::Model(format!(
                "float input with zero point {}",
                info.input_zero_point
            )));
        }
        if !(i8::MIN as i32..=i8::MAX as i32).contains(&info.input_zero_point) {
            return Err(ClassifyError::Model(format!(
                "zero point {} outside the int8 range",
                info.input_zero_point
            )));
        }

        Ok(Self {
            name: info.name.clone(),
            batch_size,
            input_height,
            input_width,
            channels,
            class_count,
            is_quantized,
            input_scale: info.input_scale,
            input_zero_point: info.input_zero_point,
        })
    }

    /// Input element type
    pub fn input_dtype(&self) -> DataType {
        if self.is_quantized {
            DataType::Int8
        } else {
            DataType::Float32
        }
    }

    /// Input tensor shape, `[batch, channel, height, width]`
    pub fn input_shape(&self) -> [usize; 4] {
        [self.batch_size, self.channels, self.input_height, self.input_width]
    }
}
