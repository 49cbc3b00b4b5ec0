use std::sync::{Arc, RwLock};

use log::{error, info, warn};

use crate::api::{ClassifyRequest, ClassifyResponse, HealthResponse, ServiceMetadata};
use crate::predictor::{HeadStatus, Predictor};

/// Failures surfaced to callers of [`ClassificationService::classify`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request rejected before reaching the predictor
    #[error("Validation error: {0}")]
    Validation(String),
    /// No predictor is bound, either because loading has not finished or because it failed
    #[error("Model is not loaded")]
    Unavailable,
    /// Inference failed; carries the cause without internal details
    #[error("Error during classification: {0}")]
    Internal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("A predictor is already bound to this service")]
    AlreadyBound,
    #[error("Refusing to serve '{0}': its classification head is untrained")]
    UntrainedHead(String),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name reported by `GET /`
    pub name: String,
    /// Serve predictors whose head was freshly attached at load time
    pub allow_uninitialized_head: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "Tonal Text Classification API".to_string(),
            allow_uninitialized_head: false,
        }
    }
}

/// Liveness report; building it never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub model_loaded: bool,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: if report.healthy { "healthy" } else { "unhealthy" }.to_string(),
            model_loaded: report.model_loaded,
        }
    }
}

/// Transport-agnostic request handling in front of one shared [`Predictor`].
///
/// The service starts without a predictor and is bound to one exactly once. Until then,
/// or forever if loading failed, `classify` answers [`ServiceError::Unavailable`].
#[derive(Debug)]
pub struct ClassificationService {
    predictor: RwLock<Option<Arc<Predictor>>>,
    config: ServiceConfig,
}

impl ClassificationService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            predictor: RwLock::new(None),
            config,
        }
    }

    /// Creates a service already bound to `predictor`.
    pub fn with_predictor(predictor: Arc<Predictor>, config: ServiceConfig) -> Result<Self, BindError> {
        let service = Self::new(config);
        service.bind(predictor)?;
        Ok(service)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Binds the predictor that will serve every subsequent request.
    ///
    /// # Errors
    /// - `AlreadyBound` if a predictor was bound before
    /// - `UntrainedHead` if the predictor's head is uninitialised and the config does not allow it
    pub fn bind(&self, predictor: Arc<Predictor>) -> Result<(), BindError> {
        let info = predictor.info();
        if info.head_status == HeadStatus::Uninitialized && !self.config.allow_uninitialized_head {
            warn!("Not binding predictor for {}: untrained head", info.model_location);
            return Err(BindError::UntrainedHead(info.model_location));
        }

        let mut slot = self
            .predictor
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(BindError::AlreadyBound);
        }
        *slot = Some(predictor);
        info!(
            "Service bound to {} on {} ({} classes)",
            info.model_location, info.device, info.num_classes
        );
        Ok(())
    }

    /// The bound predictor, if any.
    pub fn predictor(&self) -> Option<Arc<Predictor>> {
        self.predictor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.predictor().is_some()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            healthy: true,
            model_loaded: self.is_ready(),
        }
    }

    pub fn metadata(&self) -> ServiceMetadata {
        ServiceMetadata {
            message: self.config.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            docs: "/docs".to_string(),
            health: "/health".to_string(),
        }
    }

    /// Validates `request`, scores it on a blocking worker and wraps the result.
    ///
    /// One call is exactly one inference; nothing is retried or queued.
    pub async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, ServiceError> {
        request.validate().map_err(ServiceError::Validation)?;
        let predictor = self.predictor().ok_or(ServiceError::Unavailable)?;

        let ClassifyRequest { text, top_k } = request;
        let (text, result) = tokio::task::spawn_blocking(move || {
            let result = predictor.predict(&text, top_k);
            (text, result)
        })
        .await
        .map_err(|e| {
            error!("Inference worker failed: {}", e);
            ServiceError::Internal("inference worker terminated unexpectedly".to_string())
        })?;

        match result {
            Ok(prediction) => Ok(ClassifyResponse::from_prediction(text, prediction)),
            Err(e) => {
                error!("Classification failed: {}", e);
                Err(ServiceError::Internal(e.to_string()))
            }
        }
    }
}
