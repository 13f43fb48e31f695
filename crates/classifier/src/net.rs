//! Classification network wrapper

use std::path::Path;
use std::time::Instant;

use accel_runtime::Backend;
use frame_source::Frame;
use tracing::{debug, info};

use crate::extract::{self, ClassificationResult};
use crate::{
    BatchInferenceEngine, ClassifyError, ModelDescriptor, NormalizationConfig, NormalizationParams,
    Preprocessor, Profiler, Stage,
};

/// A loaded classifier: descriptor, preprocessor and inference engine.
///
/// Dropping it releases the batch buffers and the device context.
pub struct ClassifyNet {
    descriptor: ModelDescriptor,
    preprocessor: Preprocessor,
    engine: BatchInferenceEngine,
}

impl ClassifyNet {
    /// Open `device_id`, load the model and allocate the batch buffers
    pub fn new(
        backend: &dyn Backend,
        model_path: &Path,
        device_id: u32,
        normalization: &NormalizationConfig,
    ) -> Result<Self, ClassifyError> {
        let network = backend.open(model_path, device_id)?;
        let descriptor = ModelDescriptor::from_info(network.info())?;
        info!("Load model {} successfully", descriptor.name);
        info!(
            "Batch size {}, input {}x{} {}, {} classes",
            descriptor.batch_size,
            descriptor.input_height,
            descriptor.input_width,
            descriptor.input_dtype().as_str(),
            descriptor.class_count
        );

        let params = NormalizationParams::new(descriptor.input_scale, normalization)
            .with_zero_point(descriptor.input_zero_point);
        debug!("Normalization alpha={:?} beta={:?}", params.alpha, params.beta);

        let preprocessor = Preprocessor::new(&descriptor, params);
        let engine = BatchInferenceEngine::new(network, &descriptor)?;

        Ok(Self {
            descriptor,
            preprocessor,
            engine,
        })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn batch_size(&self) -> usize {
        self.descriptor.batch_size
    }

    pub fn engine(&self) -> &BatchInferenceEngine {
        &self.engine
    }

    /// Preprocess exactly one batch of images into the input tensor
    pub fn pre_forward(&mut self, images: &[Frame]) -> Result<(), ClassifyError> {
        if images.len() != self.descriptor.batch_size {
            return Err(ClassifyError::BatchSize {
                expected: self.descriptor.batch_size,
                actual: images.len(),
            });
        }
        for (slot, image) in images.iter().enumerate() {
            self.preprocessor.process_into(image, self.engine.input_mut(), slot)?;
        }
        Ok(())
    }

    /// Run inference over the preprocessed batch
    pub fn forward(&mut self) -> Result<(), ClassifyError> {
        self.engine.forward()
    }

    /// Top-1 result per image of the last batch
    pub fn post_forward(&self) -> Vec<ClassificationResult> {
        extract::top1(self.engine.scores())
    }

    /// Preprocess, infer and extract one batch, timing each stage
    pub fn classify(&mut self, images: &[Frame], profiler: &mut Profiler) -> Result<Vec<ClassificationResult>, ClassifyError> {
        let start = Instant::now();
        profiler.time(Stage::Preprocess, || self.pre_forward(images))?;
        profiler.time(Stage::Infer, || self.forward())?;
        let results = profiler.time(Stage::Postprocess, || self.post_forward());
        profiler.record(Stage::Overall, start.elapsed());
        Ok(results)
    }
}
