//! Device-resident batch input tensor

use ndarray::{Array4, Axis};

use crate::{DataType, RuntimeError};

/// Typed storage of a batch tensor
#[derive(Debug, Clone)]
pub enum TensorData {
    Float32(Array4<f32>),
    Int8(Array4<i8>),
}

/// Input buffer holding a whole batch in `[batch, channel, height, width]` layout.
///
/// Allocated once per network and overwritten in place for every batch.
#[derive(Debug, Clone)]
pub struct BatchTensor {
    data: TensorData,
}

impl BatchTensor {
    /// Allocate a zeroed tensor
    pub fn alloc(dtype: DataType, shape: [usize; 4]) -> Result<Self, RuntimeError> {
        if shape.iter().any(|&d| d == 0) {
            return Err(RuntimeError::Allocation(format!(
                "tensor shape {:?} has a zero dimension",
                shape
            )));
        }
        let data = match dtype {
            DataType::Float32 => TensorData::Float32(Array4::zeros(shape)),
            DataType::Int8 => TensorData::Int8(Array4::zeros(shape)),
        };
        Ok(Self { data })
    }

    /// Element type
    pub fn dtype(&self) -> DataType {
        match self.data {
            TensorData::Float32(_) => DataType::Float32,
            TensorData::Int8(_) => DataType::Int8,
        }
    }

    /// Shape as `[batch, channel, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        let dims = match &self.data {
            TensorData::Float32(a) => a.dim(),
            TensorData::Int8(a) => a.dim(),
        };
        [dims.0, dims.1, dims.2, dims.3]
    }

    /// Number of image slots
    pub fn batch_size(&self) -> usize {
        self.shape()[0]
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Mean of all elements in one slot, as f32
    pub fn slot_mean(&self, slot: usize) -> f32 {
        let (sum, count) = match &self.data {
            TensorData::Float32(a) => {
                let view = a.index_axis(Axis(0), slot);
                (view.iter().map(|&v| v as f64).sum::<f64>(), view.len())
            }
            TensorData::Int8(a) => {
                let view = a.index_axis(Axis(0), slot);
                (view.iter().map(|&v| v as f64).sum::<f64>(), view.len())
            }
        };
        (sum / count as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_shape_and_type() {
        let tensor = BatchTensor::alloc(DataType::Int8, [4, 3, 8, 6]).unwrap();
        assert_eq!(tensor.shape(), [4, 3, 8, 6]);
        assert_eq!(tensor.dtype(), DataType::Int8);
        assert_eq!(tensor.batch_size(), 4);
    }

    #[test]
    fn test_alloc_rejects_zero_dim() {
        assert!(matches!(
            BatchTensor::alloc(DataType::Float32, [0, 3, 224, 224]),
            Err(RuntimeError::Allocation(_))
        ));
    }

    #[test]
    fn test_slot_mean() {
        let mut tensor = BatchTensor::alloc(DataType::Float32, [2, 3, 2, 2]).unwrap();
        if let TensorData::Float32(a) = tensor.data_mut() {
            a.index_axis_mut(Axis(0), 1).fill(2.5);
        }
        assert_eq!(tensor.slot_mean(0), 0.0);
        assert!((tensor.slot_mean(1) - 2.5).abs() < 1e-6);
    }
}
