//! Classifier adapter around the exported leaf model.

use std::path::Path;

use ndarray::Array4;
use tract_onnx::prelude::*;

use crate::error::ClassifierError;
use crate::preprocess::IMAGE_SIZE;

/// Maps an NHWC image tensor to one score per vocabulary entry.
///
/// Implementations must be safe to call from several blocking threads at once.
pub trait Classifier: Send + Sync {
    fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError>;

    /// Length of the score vector, when the model declares it up front.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ONNX classifier executed with tract. The optimized plan is immutable and
/// `run` only borrows it, so one instance serves all workers.
pub struct OnnxClassifier {
    plan: OnnxPlan,
    num_classes: Option<usize>,
}

impl OnnxClassifier {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let model_path = path.display().to_string();
        if !path.is_file() {
            return Err(ClassifierError::ModelMissing(model_path));
        }

        let load_err = |e: TractError| ClassifierError::Load {
            path: model_path.clone(),
            message: e.to_string(),
        };

        let size = IMAGE_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_err)?
            .with_input_fact(0, f32::fact([1, size, size, 3]).into())
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        let num_classes = plan
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        tracing::info!(path = %model_path, ?num_classes, "Loaded ONNX model");
        Ok(Self { plan, num_classes })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let shape = input.shape().to_vec();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(&shape, &data)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let scores = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".into()))?
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        Ok(scores)
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}
