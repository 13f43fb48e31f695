//! Mock backend for development and tests
//!
//! Produces deterministic scores from the tensor contents without any model
//! file, so the full pipeline can run on machines with no device.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{Backend, BatchTensor, DataType, NetInfo, Network, RuntimeError};

/// Mock backend serving a fixed [`NetInfo`]
#[derive(Debug, Clone)]
pub struct MockBackend {
    info: NetInfo,
    executions: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

impl MockBackend {
    /// Create a mock serving `info`
    pub fn new(info: NetInfo) -> Self {
        Self {
            info,
            executions: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
        }
    }

    /// Float classifier with input `[batch, 3, height, width]` and `classes` outputs
    pub fn float32(batch: usize, height: usize, width: usize, classes: usize) -> Self {
        Self::new(NetInfo {
            name: "mock_fp32".to_string(),
            input_dtype: DataType::Float32,
            input_shape: vec![batch, 3, height, width],
            output_shape: vec![batch, classes],
            input_scale: 1.0,
            input_zero_point: 0,
        })
    }

    /// Quantized classifier with the given input scale
    pub fn int8(batch: usize, height: usize, width: usize, classes: usize, input_scale: f32) -> Self {
        Self::new(NetInfo {
            name: "mock_int8".to_string(),
            input_dtype: DataType::Int8,
            input_shape: vec![batch, 3, height, width],
            output_shape: vec![batch, classes],
            input_scale,
            input_zero_point: 0,
        })
    }

    /// Make the `n`th execution (1-based) fail
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Number of batches executed by networks opened from this backend
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Backend for MockBackend {
    fn open(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn Network>, RuntimeError> {
        if device_id != 0 {
            return Err(RuntimeError::DeviceUnavailable(device_id));
        }
        info!("Creating mock network for {}", model_path.display());
        Ok(Box::new(MockNetwork {
            info: self.info.clone(),
            executions: Arc::clone(&self.executions),
            fail_on: self.fail_on,
        }))
    }
}

/// Network returned by [`MockBackend`].
///
/// Row `i` peaks at class `(round(|slot mean|) + i) % classes` with a score
/// of 1.0 and decays with the distance from that class.
pub struct MockNetwork {
    info: NetInfo,
    executions: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

impl Network for MockNetwork {
    fn info(&self) -> &NetInfo {
        &self.info
    }

    fn execute(&mut self, input: &BatchTensor, output: &mut [f32]) -> Result<(), RuntimeError> {
        let shape = input.shape();
        if shape[..] != self.info.input_shape[..] {
            return Err(RuntimeError::ShapeMismatch {
                expected: self.info.input_shape.clone(),
                actual: shape.to_vec(),
            });
        }
        if output.len() != self.info.output_count() {
            return Err(RuntimeError::ShapeMismatch {
                expected: self.info.output_shape.clone(),
                actual: vec![output.len()],
            });
        }

        let run = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(run) {
            return Err(RuntimeError::ExecutionFailed(format!("mock failure on batch {}", run)));
        }

        let classes = output.len() / shape[0];
        if classes == 0 {
            return Ok(());
        }
        for (slot, row) in output.chunks_mut(classes).enumerate() {
            let peak = (input.slot_mean(slot).abs().round() as usize + slot) % classes;
            for (class, score) in row.iter_mut().enumerate() {
                *score = 1.0 / (1.0 + class.abs_diff(peak) as f32);
            }
        }
        debug!("Mock batch {} executed", run);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_peak_per_row() {
        let backend = MockBackend::float32(2, 4, 4, 10);
        let mut net = backend.open(Path::new("mock"), 0).unwrap();
        let tensor = BatchTensor::alloc(DataType::Float32, [2, 3, 4, 4]).unwrap();
        let mut scores = vec![0.0; 20];

        net.execute(&tensor, &mut scores).unwrap();
        // Zeroed slots: row 0 peaks at class 0, row 1 at class 1
        assert_eq!(scores[0], 1.0);
        assert_eq!(scores[10 + 1], 1.0);
        assert_eq!(backend.executions(), 1);
    }

    #[test]
    fn test_shape_mismatch() {
        let backend = MockBackend::float32(2, 4, 4, 10);
        let mut net = backend.open(Path::new("mock"), 0).unwrap();
        let tensor = BatchTensor::alloc(DataType::Float32, [1, 3, 4, 4]).unwrap();
        let mut scores = vec![0.0; 20];
        assert!(matches!(
            net.execute(&tensor, &mut scores),
            Err(RuntimeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_failing_on_second_batch() {
        let backend = MockBackend::float32(1, 2, 2, 3).failing_on(2);
        let mut net = backend.open(Path::new("mock"), 0).unwrap();
        let tensor = BatchTensor::alloc(DataType::Float32, [1, 3, 2, 2]).unwrap();
        let mut scores = vec![0.0; 3];

        assert!(net.execute(&tensor, &mut scores).is_ok());
        assert!(matches!(
            net.execute(&tensor, &mut scores),
            Err(RuntimeError::ExecutionFailed(_))
        ));
    }

    #[test]
    fn test_unknown_device() {
        let backend = MockBackend::float32(1, 2, 2, 3);
        assert!(matches!(
            backend.open(Path::new("mock"), 3),
            Err(RuntimeError::DeviceUnavailable(3))
        ));
    }
}
