use std::str::FromStr;
use std::sync::OnceLock;

use log::{debug, info};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;

use crate::predictor::{DeviceKind, PredictorError};

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Whether forward passes on one predictor may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Calls run their forward pass in parallel.
    Concurrent,
    /// Forward passes go through a single inference lock, one at a time.
    Serialized,
}

impl ExecutionPolicy {
    /// ONNX Runtime sessions are re-entrant on CPU; device providers get one pass at a time.
    pub fn for_device(device: DeviceKind) -> Self {
        match device {
            DeviceKind::Cpu => Self::Concurrent,
            DeviceKind::Gpu | DeviceKind::Accelerator => Self::Serialized,
        }
    }
}

impl FromStr for ExecutionPolicy {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" | "never" => Ok(Self::Concurrent),
            "serialized" | "always" => Ok(Self::Serialized),
            other => Err(PredictorError::ValidationError(format!(
                "Unknown execution policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
    /// `None` picks [`ExecutionPolicy::for_device`].
    pub execution_policy: Option<ExecutionPolicy>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
            execution_policy: None,
        }
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
            execution_policy: self.execution_policy,
        }
    }
}

impl RuntimeConfig {
    pub fn execution_policy_for(&self, device: DeviceKind) -> ExecutionPolicy {
        self.execution_policy
            .unwrap_or_else(|| ExecutionPolicy::for_device(device))
    }
}

fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    }
}

/// Initialises the process-wide ONNX Runtime environment once.
pub fn ensure_initialized() -> Result<(), PredictorError> {
    INIT.get_or_init(|| {
        ort::init()
            .with_name("tonal")
            .commit()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(|e| PredictorError::ModelLoadError(format!("Failed to initialize ONNX Runtime: {}", e)))
}

fn execution_provider(device: DeviceKind) -> ExecutionProviderDispatch {
    match device {
        DeviceKind::Cpu => CPUExecutionProvider::default().build(),
        DeviceKind::Gpu => CUDAExecutionProvider::default().build().error_on_failure(),
        DeviceKind::Accelerator => CoreMLExecutionProvider::default().build().error_on_failure(),
    }
}

/// Creates a session builder bound to `device`.
///
/// Registration of a GPU or accelerator provider that cannot be used fails the build
/// instead of silently falling back to CPU.
pub fn create_session_builder(
    config: &RuntimeConfig,
    device: DeviceKind,
) -> Result<SessionBuilder, PredictorError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    // Configure threading
    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    debug!("Registering {} execution provider", device);
    builder = builder
        .with_execution_providers([execution_provider(device)])
        .map_err(|e| {
            PredictorError::ModelLoadError(format!(
                "Failed to bind model to device '{}': {}",
                device, e
            ))
        })?;
    info!("Session builder ready for device {}", device);

    Ok(builder)
}
