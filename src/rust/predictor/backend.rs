use std::fmt;

use ndarray::Array2;
use serde::Serialize;

use super::encoding::EncodedBatch;
use super::error::PredictorError;

/// Whether the classification head producing the logits was trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadStatus {
    /// Head weights were loaded from the model artifacts.
    Pretrained,
    /// Head was freshly attached at load time; scores carry no signal until it is fine-tuned.
    Uninitialized,
}

impl HeadStatus {
    pub fn is_pretrained(&self) -> bool {
        matches!(self, Self::Pretrained)
    }
}

impl fmt::Display for HeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretrained => f.write_str("pretrained"),
            Self::Uninitialized => f.write_str("uninitialized"),
        }
    }
}

/// A sequence classification model that turns encoded text into class logits.
///
/// Implementations must be safe to call from several threads at once through `&self`.
/// Whether calls actually overlap on the device is decided by the predictor's
/// [`ExecutionPolicy`](crate::ExecutionPolicy), not by the backend.
pub trait ClassificationBackend: Send + Sync {
    /// Runs one forward pass and returns logits of shape `[batch_size, num_classes]`.
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError>;

    /// Number of logits produced per input.
    fn num_classes(&self) -> usize;

    fn head_status(&self) -> HeadStatus;
}
