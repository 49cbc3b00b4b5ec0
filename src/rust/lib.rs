//! Text classification scoring service over ONNX sequence classification models.
//!
//! A [`Predictor`] owns a tokenizer and a model bound to one compute device and turns
//! text into ranked `(label, score)` pairs. A [`ClassificationService`] puts one shared
//! predictor behind request validation, [`server::router`] exposes it over HTTP, and
//! [`ClassificationClient`] talks to it from the other side.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use tonal::{LabelMap, Predictor};
//!
//! let predictor = Predictor::builder()
//!     .with_model("artifacts/model")
//!     .with_label_map(LabelMap::from_names(["neutral", "positive", "negative"]))
//!     .build()?;
//!
//! let prediction = predictor.predict("This is a great product!", 2)?;
//! for result in &prediction.predictions {
//!     println!("{}: {:.3}", result.label, result.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The predictor is `Send + Sync` and is meant to be shared through `Arc`. Whether two
//! forward passes may run at the same time is controlled by [`ExecutionPolicy`].

pub mod api;
pub mod client;
pub mod config;
pub mod model_manager;
pub mod predictor;
mod runtime;
pub mod server;
pub mod service;

pub use api::{ClassifyRequest, ClassifyResponse, HealthResponse, ServiceMetadata};
pub use client::{ClassificationClient, ClientError};
pub use model_manager::{ModelError, ModelManager};
pub use predictor::{
    probe_device, CapabilityReporter, ClassificationBackend, ClassificationResult, DeviceKind, EncodedBatch,
    HeadStatus, LabelMap, OnnxClassifier, Prediction, Predictor, PredictorBuilder, PredictorError, PredictorInfo,
};
pub use runtime::{create_session_builder, ExecutionPolicy, RuntimeConfig};
pub use service::{BindError, ClassificationService, HealthReport, ServiceConfig, ServiceError};

pub fn init_logger() {
    env_logger::init();
}
