//! Upload -> diagnosis orchestration.

use std::sync::Arc;

use ndarray::Array4;

use crate::classifier::Classifier;
use crate::config::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::error::PredictError;
use crate::knowledge::KnowledgeBase;
use crate::models::{InferenceOutcome, PredictionResult};
use crate::preprocess;

/// Index and value of the largest score. Ties resolve to the lowest index.
///
/// NaN entries are skipped rather than propagated, so an all-NaN vector yields
/// `None` instead of a NaN winner that would slip past the confidence gate
/// (`NaN < threshold` is false).
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top || score.is_nan() => {}
            None if score.is_nan() => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

/// Rejects predictions whose top score falls below `threshold`.
///
/// The model has no "not a leaf" class, so a weak top score is the only
/// signal that the upload is something else entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Picks the best class from `scores`, which must line up with `kb`.
    pub fn select(
        &self,
        scores: &[f32],
        kb: &KnowledgeBase,
    ) -> Result<PredictionResult, PredictError> {
        if scores.len() != kb.len() {
            return Err(PredictError::internal(format!(
                "Classifier returned {} scores for {} labels",
                scores.len(),
                kb.len()
            )));
        }

        let (index, confidence) = argmax(scores).ok_or_else(|| {
            PredictError::internal("Classifier returned no usable scores")
        })?;
        let label = kb
            .label(index)
            .ok_or_else(|| PredictError::internal(format!("No label for class {index}")))?;

        Ok(PredictionResult {
            index,
            label: label.to_string(),
            confidence,
        })
    }

    pub fn decide(
        &self,
        scores: &[f32],
        kb: &KnowledgeBase,
    ) -> Result<InferenceOutcome, PredictError> {
        let prediction = self.select(scores, kb)?;

        if prediction.confidence < self.threshold {
            tracing::info!(
                label = %prediction.label,
                confidence = prediction.confidence,
                "Rejected low-confidence prediction"
            );
            return Ok(InferenceOutcome::Rejected {
                reason: PredictError::LowConfidence.to_string(),
            });
        }

        if prediction.confidence > 1.0 {
            tracing::warn!(
                confidence = prediction.confidence,
                "Classifier score outside [0, 1]; is the model missing its softmax?"
            );
        }

        let recommendation = kb.recommendation(&prediction.label).to_string();
        Ok(InferenceOutcome::Success {
            disease: prediction.label,
            recommendation,
        })
    }
}

/// Shared, read-only state used by every `/predict` request.
pub struct InferencePipeline {
    classifier: Arc<dyn Classifier>,
    knowledge: Arc<KnowledgeBase>,
    gate: ConfidenceGate,
}

impl InferencePipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        knowledge: Arc<KnowledgeBase>,
        gate: ConfidenceGate,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            gate,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn gate(&self) -> ConfidenceGate {
        self.gate
    }

    /// Fails when the classifier declares an output size different from the
    /// vocabulary length. Called once at startup.
    pub fn check_vocabulary(&self) -> anyhow::Result<()> {
        if let Some(classes) = self.classifier.num_classes() {
            anyhow::ensure!(
                classes == self.knowledge.len(),
                "model emits {} classes but the knowledge base has {} labels",
                classes,
                self.knowledge.len()
            );
        }
        Ok(())
    }

    /// Validates, decodes, classifies and gates a single upload. Stops at the
    /// first failing stage.
    pub fn run(&self, filename: &str, bytes: &[u8]) -> Result<InferenceOutcome, PredictError> {
        preprocess::validate_upload(filename)?;
        tracing::debug!(filename, size = bytes.len(), "Upload validated");

        let image = preprocess::decode_image(bytes)?;
        let tensor = preprocess::to_tensor(&image);
        tracing::debug!(shape = ?tensor.shape(), "Image decoded");

        self.classify_tensor(&tensor)
    }

    pub fn classify_tensor(&self, tensor: &Array4<f32>) -> Result<InferenceOutcome, PredictError> {
        let scores = self.classifier.classify(tensor)?;
        self.gate.decide(&scores, &self.knowledge)
    }
}
