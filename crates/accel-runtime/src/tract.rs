//! CPU backend running ONNX models with tract
//!
//! The model must declare concrete input and output shapes; the batch size
//! is whatever the model was exported with.

use std::path::Path;

use tract_onnx::prelude::{
    tvec, DatumType, Framework, InferenceModelExt, Tensor, TypedModel, TypedRunnableModel,
};
use tracing::{debug, info};

use crate::{Backend, BatchTensor, DataType, NetInfo, Network, RuntimeError, TensorData};

/// The only device this backend drives
pub const CPU_DEVICE: u32 = 0;

/// tract-onnx backend
#[derive(Debug, Default, Clone, Copy)]
pub struct TractBackend;

impl TractBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for TractBackend {
    fn open(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn Network>, RuntimeError> {
        if device_id != CPU_DEVICE {
            return Err(RuntimeError::DeviceUnavailable(device_id));
        }
        info!("Loading ONNX model from {}", model_path.display());

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| m.into_typed())
            .map_err(|e| RuntimeError::ModelLoad(e.to_string()))?;

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "network".to_string());

        Ok(Box::new(TractNetwork::from_typed(model, name)?))
    }
}

/// Read the first input and output facts of `model` into [`NetInfo`].
///
/// Returns the exact input datum type alongside, since quantized inputs carry
/// their parameters in it.
pub fn describe(model: &TypedModel, name: &str) -> Result<(NetInfo, DatumType), RuntimeError> {
    let input_fact = model
        .input_fact(0)
        .map_err(|e| RuntimeError::Metadata(e.to_string()))?;
    let output_fact = model
        .output_fact(0)
        .map_err(|e| RuntimeError::Metadata(e.to_string()))?;

    let input_shape = input_fact
        .shape
        .as_concrete()
        .ok_or_else(|| RuntimeError::Metadata("input shape is not fixed".to_string()))?
        .to_vec();
    let output_shape = output_fact
        .shape
        .as_concrete()
        .ok_or_else(|| RuntimeError::Metadata("output shape is not fixed".to_string()))?
        .to_vec();

    let input_dt = input_fact.datum_type;
    let (input_dtype, input_scale, input_zero_point) = match input_dt.unquantized() {
        DatumType::F32 => (DataType::Float32, 1.0, 0),
        // Quantized inputs store real / scale + zero_point
        DatumType::I8 => match input_dt.qparams() {
            Some(q) => {
                let (zero_point, scale) = q.zp_scale();
                (DataType::Int8, 1.0 / scale, zero_point)
            }
            None => (DataType::Int8, 1.0, 0),
        },
        other => {
            return Err(RuntimeError::Metadata(format!(
                "unsupported input type {:?}",
                other
            )))
        }
    };

    let info = NetInfo {
        name: name.to_string(),
        input_dtype,
        input_shape,
        output_shape,
        input_scale,
        input_zero_point,
    };
    Ok((info, input_dt))
}

/// A model loaded into tract
pub struct TractNetwork {
    plan: TypedRunnableModel<TypedModel>,
    input_dt: DatumType,
    info: NetInfo,
}

impl TractNetwork {
    /// Describe, optimize and plan a typed model
    pub fn from_typed(model: TypedModel, name: impl Into<String>) -> Result<Self, RuntimeError> {
        let name = name.into();
        let (info, input_dt) = describe(&model, &name)?;

        let plan = model
            .into_optimized()
            .and_then(|m| m.into_runnable())
            .map_err(|e| RuntimeError::ModelLoad(e.to_string()))?;

        debug!(
            "Network {}: input {:?} {} (scale {}, zero point {}), output {:?}",
            info.name,
            info.input_shape,
            info.input_dtype.as_str(),
            info.input_scale,
            info.input_zero_point,
            info.output_shape
        );

        Ok(Self {
            plan,
            input_dt,
            info,
        })
    }
}

impl Network for TractNetwork {
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

        let not_contiguous = || RuntimeError::ExecutionFailed("input tensor is not contiguous".to_string());
        let mut tensor = match input.data() {
            TensorData::Float32(a) => Tensor::from_shape(&shape, a.as_slice().ok_or_else(not_contiguous)?),
            TensorData::Int8(a) => Tensor::from_shape(&shape, a.as_slice().ok_or_else(not_contiguous)?),
        }
        .map_err(|e| RuntimeError::ExecutionFailed(e.to_string()))?;

        if self.input_dt.qparams().is_some() {
            // SAFETY: QI8 shares the i8 storage layout, only the quantization
            // parameters attached to the type differ
            unsafe { tensor.set_datum_type(self.input_dt) };
        }

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| RuntimeError::ExecutionFailed(e.to_string()))?;

        copy_scores(&outputs[0], output)
    }
}

/// Copy an output tensor into `output` as f32, dequantizing 8-bit outputs
fn copy_scores(scores: &Tensor, output: &mut [f32]) -> Result<(), RuntimeError> {
    if scores.len() != output.len() {
        return Err(RuntimeError::ShapeMismatch {
            expected: vec![output.len()],
            actual: scores.shape().to_vec(),
        });
    }

    let dt = scores.datum_type();
    let Some(q) = dt.qparams() else {
        let cast = scores.cast_to::<f32>().map_err(exec_err)?;
        output.copy_from_slice(cast.as_slice::<f32>().map_err(exec_err)?);
        return Ok(());
    };

    let (zero_point, scale) = q.zp_scale();
    let mut raw = scores.clone();
    let storage = dt.unquantized();
    // SAFETY: dropping the quantization parameters keeps the storage type
    unsafe { raw.set_datum_type(storage) };
    let stored: Vec<i32> = match storage {
        DatumType::I8 => raw.as_slice::<i8>().map_err(exec_err)?.iter().map(|&v| v as i32).collect(),
        DatumType::U8 => raw.as_slice::<u8>().map_err(exec_err)?.iter().map(|&v| v as i32).collect(),
        other => {
            return Err(RuntimeError::ExecutionFailed(format!(
                "unsupported quantized output {:?}",
                other
            )))
        }
    };
    for (out, v) in output.iter_mut().zip(stored) {
        *out = (v - zero_point) as f32 * scale;
    }
    Ok(())
}

fn exec_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::ExecutionFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::{QParams, SpecialOps, TDim, TypedFact};
    use tract_onnx::tract_hir::tract_core::ops::change_axes::AxisOp;

    /// `[2, 3, 4, 4]` input flattened to `[2, 48]` scores
    fn flatten_model(dt: DatumType) -> TypedModel {
        let mut model = TypedModel::default();
        let source = model
            .add_source("input", TypedFact::dt_shape(dt, [2usize, 3, 4, 4]))
            .unwrap();
        let flat = model
            .wire_node(
                "flatten",
                AxisOp::Reshape(1, tvec![TDim::Val(3), TDim::Val(4), TDim::Val(4)], tvec![TDim::Val(48)]),
                &[source],
            )
            .unwrap();
        model.set_output_outlets(&flat).unwrap();
        model
    }

    fn qi8(zero_point: i32, scale: f32) -> DatumType {
        DatumType::QI8(QParams::ZpScale { zero_point, scale })
    }

    #[test]
    fn test_rejects_non_cpu_device() {
        let result = TractBackend::new().open(Path::new("model.onnx"), 1);
        assert!(matches!(result, Err(RuntimeError::DeviceUnavailable(1))));
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let result = TractBackend::new().open(Path::new("/nonexistent/model.onnx"), CPU_DEVICE);
        assert!(matches!(result, Err(RuntimeError::ModelLoad(_))));
    }

    #[test]
    fn test_describe_float_model() {
        let (info, dt) = describe(&flatten_model(DatumType::F32), "flat").unwrap();
        assert_eq!(dt, DatumType::F32);
        assert_eq!(info.name, "flat");
        assert_eq!(info.input_dtype, DataType::Float32);
        assert_eq!(info.input_shape, vec![2, 3, 4, 4]);
        assert_eq!(info.output_shape, vec![2, 48]);
        assert_eq!(info.input_scale, 1.0);
        assert_eq!(info.input_zero_point, 0);
    }

    #[test]
    fn test_describe_quantized_model() {
        let (info, dt) = describe(&flatten_model(qi8(-3, 0.25)), "flat_q").unwrap();
        assert_eq!(dt, qi8(-3, 0.25));
        assert_eq!(info.input_dtype, DataType::Int8);
        assert_eq!(info.input_scale, 4.0);
        assert_eq!(info.input_zero_point, -3);
    }

    #[test]
    fn test_describe_rejects_unsupported_input() {
        let result = describe(&flatten_model(DatumType::I64), "flat");
        assert!(matches!(result, Err(RuntimeError::Metadata(_))));
    }

    #[test]
    fn test_execute_float_model() {
        let mut net = TractNetwork::from_typed(flatten_model(DatumType::F32), "flat").unwrap();
        let mut input = BatchTensor::alloc(DataType::Float32, [2, 3, 4, 4]).unwrap();
        if let TensorData::Float32(data) = input.data_mut() {
            data.iter_mut().enumerate().for_each(|(i, v)| *v = i as f32 * 0.5);
        }

        let mut scores = vec![0.0; 96];
        net.execute(&input, &mut scores).unwrap();
        let expected: Vec<f32> = (0..96).map(|i| i as f32 * 0.5).collect();
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_execute_quantized_model_dequantizes() {
        let mut net = TractNetwork::from_typed(flatten_model(qi8(-3, 0.25)), "flat_q").unwrap();
        let mut input = BatchTensor::alloc(DataType::Int8, [2, 3, 4, 4]).unwrap();
        if let TensorData::Int8(data) = input.data_mut() {
            data.iter_mut().enumerate().for_each(|(i, v)| *v = (i % 50) as i8 - 20);
        }

        let mut scores = vec![0.0; 96];
        net.execute(&input, &mut scores).unwrap();
        for (i, score) in scores.iter().enumerate() {
            let stored = (i % 50) as i32 - 20;
            assert_eq!(*score, (stored + 3) as f32 * 0.25);
        }
    }

    #[test]
    fn test_execute_rejects_wrong_shapes() {
        let mut net = TractNetwork::from_typed(flatten_model(DatumType::F32), "flat").unwrap();
        let wrong_input = BatchTensor::alloc(DataType::Float32, [1, 3, 4, 4]).unwrap();
        let mut scores = vec![0.0; 96];
        assert!(matches!(
            net.execute(&wrong_input, &mut scores),
            Err(RuntimeError::ShapeMismatch { .. })
        ));

        let input = BatchTensor::alloc(DataType::Float32, [2, 3, 4, 4]).unwrap();
        let mut short = vec![0.0; 10];
        assert!(matches!(
            net.execute(&input, &mut short),
            Err(RuntimeError::ShapeMismatch { .. })
        ));
    }
}
