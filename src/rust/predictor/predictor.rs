use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::debug;
use tokenizers::Tokenizer;

use super::backend::{ClassificationBackend, HeadStatus};
use super::device::DeviceKind;
use super::encoding::{configure_tokenizer, encode, MAX_SEQUENCE_LENGTH};
use super::error::PredictorError;
use super::labels::LabelMap;
use super::scoring::{clamp_top_k, rank, softmax};
use super::{ClassificationResult, Prediction, PredictorInfo};
use crate::runtime::ExecutionPolicy;

/// Default number of predictions returned per text.
pub const DEFAULT_TOP_K: usize = 3;

/// A thread-safe text classifier bound to one compute device.
///
/// Built once at startup and shared through `Arc`; every method takes `&self`.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use tonal::Predictor;
///
/// let predictor = Predictor::builder()
///     .with_model("artifacts/model")
///     .with_device("cpu")
///     .build()?;
///
/// let prediction = predictor.predict("great product", 1)?;
/// println!("{}: {:.3}", prediction.predictions[0].label, prediction.predictions[0].score);
/// # Ok(())
/// # }
/// ```
pub struct Predictor {
    model_location: String,
    device: DeviceKind,
    tokenizer: Arc<Tokenizer>,
    backend: Arc<dyn ClassificationBackend>,
    label_map: Arc<LabelMap>,
    policy: ExecutionPolicy,
    inference_lock: Mutex<()>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Predictor>();
    }
};

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("model_location", &self.model_location)
            .field("device", &self.device)
            .field("head_status", &self.backend.head_status())
            .field("label_map", &self.label_map)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Predictor {
    /// Creates a new PredictorBuilder for fluent construction
    pub fn builder() -> super::builder::PredictorBuilder {
        super::builder::PredictorBuilder::new()
    }

    /// Assembles a predictor from an already loaded tokenizer and backend.
    ///
    /// The tokenizer is reconfigured to truncate at 256 tokens and pad to the longest
    /// sequence in a batch.
    pub fn from_parts(
        model_location: impl Into<String>,
        device: DeviceKind,
        mut tokenizer: Tokenizer,
        backend: Arc<dyn ClassificationBackend>,
        label_map: LabelMap,
        policy: ExecutionPolicy,
    ) -> Result<Self, PredictorError> {
        configure_tokenizer(&mut tokenizer, MAX_SEQUENCE_LENGTH)?;
        Ok(Self {
            model_location: model_location.into(),
            device,
            tokenizer: Arc::new(tokenizer),
            backend,
            label_map: Arc::new(label_map),
            policy,
            inference_lock: Mutex::new(()),
        })
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn head_status(&self) -> HeadStatus {
        self.backend.head_status()
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Returns information about the predictor's current state
    pub fn info(&self) -> PredictorInfo {
        PredictorInfo {
            model_location: self.model_location.clone(),
            device: self.device,
            head_status: self.backend.head_status(),
            num_classes: self.backend.num_classes(),
            labels: (0..self.backend.num_classes())
                .map(|idx| self.label_map.label(idx))
                .collect(),
            execution_policy: self.policy,
        }
    }

    /// Scores `text` and returns the `top_k` most likely labels, highest first.
    ///
    /// `top_k` is clamped into `[1, number_of_classes]`. Equal scores are ordered by class
    /// index. An empty string is scored like any other input.
    ///
    /// # Errors
    /// - `TokenizerError` if the text cannot be encoded
    /// - `InferenceError` if the forward pass fails; the call is not retried
    pub fn predict(&self, text: &str, top_k: usize) -> Result<Prediction, PredictorError> {
        let start = Instant::now();

        let probabilities = self.distribution(text)?;
        let k = clamp_top_k(top_k, probabilities.len());
        let predictions = rank(probabilities.view(), k)
            .into_iter()
            .map(|(idx, score)| ClassificationResult {
                label: self.label_map.label(idx),
                score,
            })
            .collect();

        let processing_time = start.elapsed().as_secs_f64();
        debug!("Scored {} chars in {:.4}s", text.len(), processing_time);
        Ok(Prediction {
            predictions,
            processing_time,
        })
    }

    /// Scores each text in order, as if `predict` were called once per element.
    ///
    /// The first failing element fails the whole batch; no partial results are returned.
    pub fn predict_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        top_k: usize,
    ) -> Result<Vec<Prediction>, PredictorError> {
        texts
            .iter()
            .map(|text| self.predict(text.as_ref(), top_k))
            .collect()
    }

    /// Full class probability distribution for `text`, in class index order.
    pub fn distribution(&self, text: &str) -> Result<ndarray::Array1<f32>, PredictorError> {
        let batch = encode(&self.tokenizer, text)?;
        let logits = self.run_forward(&batch)?;
        if logits.nrows() != 1 || logits.ncols() == 0 {
            return Err(PredictorError::InferenceError(format!(
                "Unexpected logits shape {:?}",
                logits.shape()
            )));
        }
        if let Some(bad) = logits.iter().find(|value| !value.is_finite()) {
            return Err(PredictorError::InferenceError(format!(
                "Model produced a non-finite logit ({})",
                bad
            )));
        }
        let probabilities = softmax(logits.row(0));
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(PredictorError::InferenceError(
                "Softmax produced non-finite probabilities".to_string(),
            ));
        }
        Ok(probabilities)
    }

    fn run_forward(
        &self,
        batch: &super::EncodedBatch,
    ) -> Result<ndarray::Array2<f32>, PredictorError> {
        match self.policy {
            ExecutionPolicy::Concurrent => self.backend.forward(batch),
            ExecutionPolicy::Serialized => {
                // a panic in an earlier pass leaves no state behind the lock worth discarding
                let _guard = self
                    .inference_lock
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                self.backend.forward(batch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::{fixture_predictor, predictor_with, FailingBackend, FixedLogitsBackend};

    #[test]
    fn test_predict_positive_text() {
        let predictor = fixture_predictor();
        let prediction = predictor.predict("great product", 1).unwrap();
        assert_eq!(prediction.predictions.len(), 1);
        assert_eq!(prediction.predictions[0].label, "positive");
        assert!(prediction.predictions[0].score > 0.0 && prediction.predictions[0].score <= 1.0);
        assert!(prediction.processing_time > 0.0);
    }

    #[test]
    fn test_result_count_is_clamped() {
        let predictor = fixture_predictor();
        for k in 1..=10 {
            let prediction = predictor.predict("bad service", k).unwrap();
            assert_eq!(prediction.predictions.len(), k.min(3));
            let scores: Vec<f32> = prediction.predictions.iter().map(|p| p.score).collect();
            assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        }
        assert_eq!(predictor.predict("bad", 0).unwrap().predictions.len(), 1);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let predictor = fixture_predictor();
        let probs = predictor.distribution("great but awful").unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_text_still_scores() {
        let predictor = fixture_predictor();
        let prediction = predictor.predict("", 3).unwrap();
        assert_eq!(prediction.predictions.len(), 3);
        assert_eq!(prediction.predictions[0].label, "neutral");
    }

    #[test]
    fn test_inference_failure_propagates() {
        let predictor = Predictor::from_parts(
            "failing",
            DeviceKind::Cpu,
            crate::predictor::test_support::fixture_tokenizer(),
            Arc::new(FailingBackend),
            LabelMap::default(),
            ExecutionPolicy::Concurrent,
        )
        .unwrap();
        let err = predictor.predict("great", 1).unwrap_err();
        assert!(matches!(err, PredictorError::InferenceError(_)));
        assert!(predictor.predict_batch(&["great", "bad"], 1).is_err());
    }

    #[test]
    fn test_non_finite_logits_are_inference_errors() {
        for logits in [
            vec![0.0, f32::INFINITY, 1.0],
            vec![f32::NEG_INFINITY, 0.0, 1.0],
            vec![0.0, f32::NAN, 1.0],
        ] {
            let predictor = predictor_with(Arc::new(FixedLogitsBackend(logits.clone())));
            let err = predictor.predict("great product", 3).unwrap_err();
            assert!(
                matches!(err, PredictorError::InferenceError(_)),
                "{:?} gave {:?}",
                logits,
                err
            );
            assert!(predictor.distribution("great product").is_err());
        }
    }

    #[test]
    fn test_extreme_finite_logits_still_score() {
        let predictor = predictor_with(Arc::new(FixedLogitsBackend(vec![-1e30, 1e30, 0.0])));
        let prediction = predictor.predict("anything", 3).unwrap();
        assert_eq!(prediction.predictions[0].label, "positive");
        assert!(prediction
            .predictions
            .iter()
            .all(|p| p.score.is_finite() && (0.0..=1.0).contains(&p.score)));
    }

    #[test]
    fn test_info_reports_labels() {
        let predictor = fixture_predictor();
        let info = predictor.info();
        assert_eq!(info.num_classes, 3);
        assert_eq!(info.labels, vec!["neutral", "positive", "negative"]);
        assert_eq!(info.head_status, HeadStatus::Pretrained);
        assert_eq!(info.device, DeviceKind::Cpu);
    }
}
