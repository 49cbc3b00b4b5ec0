#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;
use tokenizers::Tokenizer;
use tonal::{
    ClassificationBackend, DeviceKind, EncodedBatch, ExecutionPolicy, HeadStatus, LabelMap, Predictor,
    PredictorError,
};

const POSITIVE_IDS: [i64; 4] = [2, 3, 4, 5];
const NEGATIVE_IDS: [i64; 4] = [6, 7, 8, 9];

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn fixture_tokenizer() -> Tokenizer {
    Tokenizer::from_file(fixture_path("tokenizer.json")).expect("fixture tokenizer should load")
}

/// `[neutral, positive, negative]` logits from sentiment word counts.
fn keyword_logits(batch: &EncodedBatch) -> Array2<f32> {
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
        logits[[row, 1]] = 1.5 * count(&POSITIVE_IDS);
        logits[[row, 2]] = 1.5 * count(&NEGATIVE_IDS);
    }
    logits
}

pub struct KeywordBackend;

impl ClassificationBackend for KeywordBackend {
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        Ok(keyword_logits(batch))
    }

    fn num_classes(&self) -> usize {
        3
    }

    fn head_status(&self) -> HeadStatus {
        HeadStatus::Pretrained
    }
}

/// Keyword backend that records how many forward passes overlap.
pub struct CountingBackend {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassificationBackend for CountingBackend {
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(keyword_logits(batch))
    }

    fn num_classes(&self) -> usize {
        3
    }

    fn head_status(&self) -> HeadStatus {
        HeadStatus::Pretrained
    }
}

pub fn predictor_with(backend: Arc<dyn ClassificationBackend>, policy: ExecutionPolicy) -> Predictor {
    Predictor::from_parts(
        "fixture",
        DeviceKind::Cpu,
        fixture_tokenizer(),
        backend,
        LabelMap::default(),
        policy,
    )
    .expect("fixture predictor should build")
}

pub fn keyword_predictor() -> Predictor {
    predictor_with(Arc::new(KeywordBackend), ExecutionPolicy::Concurrent)
}
