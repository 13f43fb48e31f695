//! Accelerator Runtime
//!
//! The narrow contract the classifier needs from an inference device:
//! - open a device and load a compiled model ([`Backend`])
//! - query network metadata ([`NetInfo`])
//! - allocate device-resident input tensors ([`BatchTensor`])
//! - convert decoded frames into the model's planar pixel layout ([`vpp`])
//! - execute one batch synchronously ([`Network::execute`])
//!
//! Ships a CPU backend built on tract-onnx and a deterministic mock backend.

mod backend;
pub mod mock;
mod tensor;
pub mod tract;
pub mod vpp;

pub use backend::{Backend, DataType, NetInfo, Network};
pub use mock::MockBackend;
pub use tensor::{BatchTensor, TensorData};
pub use tract::TractBackend;
pub use vpp::PlanarImage;

use thiserror::Error;

/// Errors raised by the accelerator runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Device {0} is not available")]
    DeviceUnavailable(u32),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Model metadata query failed: {0}")]
    Metadata(String),
    #[error("Buffer allocation failed: {0}")]
    Allocation(String),
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Inference failed: {0}")]
    ExecutionFailed(String),
}
