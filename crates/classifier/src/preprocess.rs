//! Image preprocessing into the batch tensor

use accel_runtime::{vpp, BatchTensor, TensorData};
use frame_source::Frame;
use ndarray::{Axis, Zip};

use crate::{ClassifyError, ModelDescriptor, NormalizationParams};

/// Resizes decoded frames to the network resolution and writes them,
/// normalized, into a slot of the batch tensor.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    height: usize,
    width: usize,
    params: NormalizationParams,
}

impl Preprocessor {
    pub fn new(descriptor: &ModelDescriptor, params: NormalizationParams) -> Self {
        Self {
            height: descriptor.input_height,
            width: descriptor.input_width,
            params,
        }
    }

    pub fn params(&self) -> &NormalizationParams {
        &self.params
    }

    /// Convert `frame` and store it in slot `slot` of `tensor`
    pub fn process_into(&self, frame: &Frame, tensor: &mut BatchTensor, slot: usize) -> Result<(), ClassifyError> {
        let batch_size = tensor.batch_size();
        if slot >= batch_size {
            return Err(ClassifyError::BatchSize {
                expected: batch_size,
                actual: slot + 1,
            });
        }

        let planar = vpp::convert_to_planar(frame, self.height, self.width)?;
        let params = &self.params;

        match tensor.data_mut() {
            TensorData::Float32(data) => {
                let mut dst = data.index_axis_mut(Axis(0), slot);
                for c in 0..3 {
                    Zip::from(dst.index_axis_mut(Axis(0), c))
                        .and(planar.data.index_axis(Axis(0), c))
                        .for_each(|out, &pixel| *out = params.apply(c, pixel));
                }
            }
            TensorData::Int8(data) => {
                let mut dst = data.index_axis_mut(Axis(0), slot);
                for c in 0..3 {
                    Zip::from(dst.index_axis_mut(Axis(0), c))
                        .and(planar.data.index_axis(Axis(0), c))
                        .for_each(|out, &pixel| *out = params.apply_i8(c, pixel));
                }
            }
        }
        Ok(())
    }
}
