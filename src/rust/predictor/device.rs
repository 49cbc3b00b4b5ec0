use std::fmt;
use std::str::FromStr;

use log::debug;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider};
use serde::Serialize;

use super::error::PredictorError;

/// Compute device a predictor is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    /// CUDA capable GPU
    Gpu,
    /// Unified-memory accelerator (Apple Neural Engine / Metal through CoreML)
    Accelerator,
}

impl DeviceKind {
    /// Probe order used when no device is requested explicitly.
    pub const PRIORITY: [DeviceKind; 3] = [DeviceKind::Accelerator, DeviceKind::Gpu, DeviceKind::Cpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "cuda",
            Self::Accelerator => "mps",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Gpu),
            "mps" | "coreml" | "accelerator" => Ok(Self::Accelerator),
            other => Err(PredictorError::ValidationError(format!(
                "Unknown device '{}'. Expected one of: cpu, cuda, gpu, mps, coreml, accelerator",
                other
            ))),
        }
    }
}

/// Reports which compute backends the host can use.
pub trait CapabilityReporter {
    fn accelerator_available(&self) -> bool;
    fn gpu_available(&self) -> bool;

    fn is_available(&self, device: DeviceKind) -> bool {
        match device {
            DeviceKind::Accelerator => self.accelerator_available(),
            DeviceKind::Gpu => self.gpu_available(),
            DeviceKind::Cpu => true,
        }
    }
}

/// Asks ONNX Runtime which execution providers were compiled in and can be registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtCapabilities;

impl CapabilityReporter for OrtCapabilities {
    fn accelerator_available(&self) -> bool {
        CoreMLExecutionProvider::default().is_available().unwrap_or(false)
    }

    fn gpu_available(&self) -> bool {
        CUDAExecutionProvider::default().is_available().unwrap_or(false)
    }
}

/// Picks the first available device in [`DeviceKind::PRIORITY`] order.
///
/// The order is a fixed policy rather than a measurement, so the same host
/// always resolves to the same device. CPU is always available.
pub fn probe_device(capabilities: &dyn CapabilityReporter) -> DeviceKind {
    let device = DeviceKind::PRIORITY
        .into_iter()
        .find(|device| capabilities.is_available(*device))
        .unwrap_or(DeviceKind::Cpu);
    debug!("Probed compute device: {}", device);
    device
}

/// Resolves an explicit device request, falling back to probing.
pub fn resolve_device(
    requested: Option<&str>,
    capabilities: &dyn CapabilityReporter,
) -> Result<DeviceKind, PredictorError> {
    match requested {
        Some(name) => name.parse(),
        None => Ok(probe_device(capabilities)),
    }
}
