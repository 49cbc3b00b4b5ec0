//! Fixtures shared by unit tests: a word-level tokenizer and keyword-driven backends.

use std::sync::Arc;

use ndarray::Array2;
use tokenizers::Tokenizer;

use super::{ClassificationBackend, DeviceKind, EncodedBatch, HeadStatus, LabelMap, Predictor, PredictorError};
use crate::runtime::ExecutionPolicy;

const TOKENIZER_JSON: &[u8] = include_bytes!("../../../tests/fixtures/tokenizer.json");

const POSITIVE_IDS: [i64; 4] = [2, 3, 4, 5];
const NEGATIVE_IDS: [i64; 4] = [6, 7, 8, 9];

pub(crate) fn fixture_tokenizer() -> Tokenizer {
    Tokenizer::from_bytes(TOKENIZER_JSON).expect("fixture tokenizer should parse")
}

/// Scores `[neutral, positive, negative]` by counting sentiment words.
pub(crate) struct KeywordBackend;

impl ClassificationBackend for KeywordBackend {
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        let mut logits = Array2::zeros((batch.batch_size(), 3));
        for (row, (ids, mask)) in batch
            .input_ids
            .outer_iter()
            .zip(batch.attention_mask.outer_iter())
            .enumerate()
        {
            let count = |set: &[i64]| {
                ids.iter()
                    .zip(mask.iter())
                    .filter(|(id, m)| **m == 1 && set.contains(id))
                    .count() as f32
            };
            logits[[row, 0]] = 0.5;
            logits[[row, 1]] = 2.0 * count(&POSITIVE_IDS);
            logits[[row, 2]] = 2.0 * count(&NEGATIVE_IDS);
        }
        Ok(logits)
    }

    fn num_classes(&self) -> usize {
        3
    }

    fn head_status(&self) -> HeadStatus {
        HeadStatus::Pretrained
    }
}

pub(crate) struct FailingBackend;

impl ClassificationBackend for FailingBackend {
    fn forward(&self, _batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        Err(PredictorError::InferenceError("device out of memory".into()))
    }

    fn num_classes(&self) -> usize {
        3
    }

    fn head_status(&self) -> HeadStatus {
        HeadStatus::Pretrained
    }
}

/// Returns the same logits row for every input.
pub(crate) struct FixedLogitsBackend(pub Vec<f32>);

impl ClassificationBackend for FixedLogitsBackend {
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        let row = ndarray::Array1::from(self.0.clone());
        let rows = vec![row.view(); batch.batch_size()];
        ndarray::stack(ndarray::Axis(0), &rows)
            .map_err(|e| PredictorError::InferenceError(e.to_string()))
    }

    fn num_classes(&self) -> usize {
        self.0.len()
    }

    fn head_status(&self) -> HeadStatus {
        HeadStatus::Pretrained
    }
}

pub(crate) fn predictor_with(backend: Arc<dyn ClassificationBackend>) -> Predictor {
    Predictor::from_parts(
        "fixture",
        DeviceKind::Cpu,
        fixture_tokenizer(),
        backend,
        LabelMap::default(),
        ExecutionPolicy::Concurrent,
    )
    .expect("fixture predictor should build")
}

pub(crate) fn fixture_predictor() -> Predictor {
    Predictor::from_parts(
        "fixture",
        DeviceKind::Cpu,
        fixture_tokenizer(),
        Arc::new(KeywordBackend),
        LabelMap::default(),
        ExecutionPolicy::Concurrent,
    )
    .expect("fixture predictor should build")
}
