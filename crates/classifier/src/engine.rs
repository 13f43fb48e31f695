//! Batched inference dispatch

use accel_runtime::{BatchTensor, Network, RuntimeError};
use tracing::debug;

use crate::{ClassifyError, ModelDescriptor};

/// Flat `batch_size x class_count` score matrix, one row per image
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBuffer {
    data: Vec<f32>,
    batch_size: usize,
    class_count: usize,
}

impl ScoreBuffer {
    /// Allocate a zeroed buffer
    pub fn new(batch_size: usize, class_count: usize) -> Result<Self, RuntimeError> {
        if batch_size == 0 || class_count == 0 {
            return Err(RuntimeError::Allocation(format!(
                "score buffer {}x{} is empty",
                batch_size, class_count
            )));
        }
        Ok(Self {
            data: vec![0.0; batch_size * class_count],
            batch_size,
            class_count,
        })
    }

    /// Wrap existing scores; `data.len()` must be a multiple of `class_count`
    pub fn from_vec(data: Vec<f32>, class_count: usize) -> Result<Self, RuntimeError> {
        if class_count == 0 || data.is_empty() || data.len() % class_count != 0 {
            return Err(RuntimeError::Allocation(format!(
                "{} scores do not split into rows of {}",
                data.len(),
                class_count
            )));
        }
        Ok(Self {
            batch_size: data.len() / class_count,
            data,
            class_count,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    /// Scores of image `i`
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.class_count..(i + 1) * self.class_count]
    }

    /// Rows in batch order
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.class_count)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Owns the network, its input tensor and its score buffer.
///
/// Both buffers are allocated once and overwritten by every batch; `&mut self`
/// on every mutating call keeps a single batch in flight.
pub struct BatchInferenceEngine {
    network: Box<dyn Network>,
    input: BatchTensor,
    scores: ScoreBuffer,
}

impl BatchInferenceEngine {
    /// Allocate buffers sized from `descriptor`
    pub fn new(network: Box<dyn Network>, descriptor: &ModelDescriptor) -> Result<Self, ClassifyError> {
        let input = BatchTensor::alloc(descriptor.input_dtype(), descriptor.input_shape())?;
        let scores = ScoreBuffer::new(descriptor.batch_size, descriptor.class_count)?;
        debug!(
            "Allocated {} input {:?} and {}x{} score buffer",
            descriptor.input_dtype().as_str(),
            descriptor.input_shape(),
            descriptor.batch_size,
            descriptor.class_count
        );
        Ok(Self {
            network,
            input,
            scores,
        })
    }

    pub fn input(&self) -> &BatchTensor {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut BatchTensor {
        &mut self.input
    }

    pub fn scores(&self) -> &ScoreBuffer {
        &self.scores
    }

    /// Run the network over the current input tensor, blocking until done
    pub fn forward(&mut self) -> Result<(), ClassifyError> {
        self.network.execute(&self.input, self.scores.as_mut_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_runtime::{Backend, MockBackend};
    use std::path::Path;

    #[test]
    fn test_score_rows() {
        let scores = ScoreBuffer::from_vec(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3).unwrap();
        assert_eq!(scores.batch_size(), 2);
        assert_eq!(scores.row(1), &[0.4, 0.5, 0.6]);
        assert_eq!(scores.rows().count(), 2);
    }

    #[test]
    fn test_from_vec_rejects_ragged() {
        assert!(ScoreBuffer::from_vec(vec![0.0; 5], 3).is_err());
        assert!(ScoreBuffer::new(0, 10).is_err());
    }

    #[test]
    fn test_forward_fills_scores() {
        let backend = MockBackend::float32(2, 4, 4, 6);
        let network = backend.open(Path::new("mock"), 0).unwrap();
        let descriptor = ModelDescriptor::from_info(network.info()).unwrap();
        let mut engine = BatchInferenceEngine::new(network, &descriptor).unwrap();

        engine.forward().unwrap();
        assert_eq!(engine.scores().row(0)[0], 1.0);
        assert_eq!(engine.scores().row(1)[1], 1.0);
        assert_eq!(backend.executions(), 1);
    }

    #[test]
    fn test_forward_failure_is_runtime_error() {
        let backend = MockBackend::float32(1, 2, 2, 2).failing_on(1);
        let network = backend.open(Path::new("mock"), 0).unwrap();
        let descriptor = ModelDescriptor::from_info(network.info()).unwrap();
        let mut engine = BatchInferenceEngine::new(network, &descriptor).unwrap();
        assert!(matches!(
            engine.forward(),
            Err(ClassifyError::Runtime(RuntimeError::ExecutionFailed(_)))
        ));
    }
}
