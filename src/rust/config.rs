use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use clap::{Parser, ValueEnum};

use crate::predictor::{LabelMap, PredictorBuilder};
use crate::runtime::{ExecutionPolicy, RuntimeConfig};
use crate::service::ServiceConfig;

/// When forward passes go through the inference lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SerializeMode {
    /// Serialize on GPU and accelerator devices only
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Serve a text classification model over HTTP", long_about = None)]
pub struct ServeArgs {
    /// Local model directory or hub repository id
    #[arg(short, long, env = "TONAL_MODEL", default_value = "artifacts/model")]
    pub model: String,

    /// Compute device (cpu, cuda, mps); probed when omitted
    #[arg(short, long, env = "TONAL_DEVICE")]
    pub device: Option<String>,

    /// Comma-separated labels in class index order
    #[arg(short, long, env = "TONAL_LABELS")]
    pub labels: Option<LabelMap>,

    #[arg(long, env = "TONAL_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(short, long, env = "TONAL_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Serve a hub model whose classification head was attached untrained
    #[arg(long, env = "TONAL_ALLOW_UNTRAINED_HEAD")]
    pub allow_untrained_head: bool,

    #[arg(long, env = "TONAL_SERIALIZE_INFERENCE", value_enum, default_value_t = SerializeMode::Auto)]
    pub serialize_inference: SerializeMode,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, env = "TONAL_INTRA_THREADS", default_value_t = 0)]
    pub intra_threads: usize,

    /// Download a hub model into the cache before loading it
    #[arg(long, env = "TONAL_DOWNLOAD")]
    pub download: bool,

    /// Force a fresh download of the model files
    #[arg(short, long, env = "TONAL_FRESH")]
    pub fresh: bool,

    /// Keep serving (with 503s) when the model fails to load instead of exiting
    #[arg(long, env = "TONAL_SERVE_DEGRADED")]
    pub serve_degraded: bool,
}

impl ServeArgs {
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether `--model` names a hub repository rather than a local directory.
    pub fn is_hub_model(&self) -> bool {
        !Path::new(&self.model).is_dir()
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            intra_threads: self.intra_threads,
            execution_policy: match self.serialize_inference {
                SerializeMode::Auto => None,
                SerializeMode::Always => Some(ExecutionPolicy::Serialized),
                SerializeMode::Never => Some(ExecutionPolicy::Concurrent),
            },
            ..RuntimeConfig::default()
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            allow_uninitialized_head: self.allow_untrained_head,
            ..ServiceConfig::default()
        }
    }

    pub fn predictor_builder(&self) -> PredictorBuilder {
        let mut builder = PredictorBuilder::new()
            .with_model(self.model.clone())
            .with_runtime_config(self.runtime_config());
        if let Some(device) = &self.device {
            builder = builder.with_device(device.clone());
        }
        if let Some(labels) = &self.labels {
            builder = builder.with_label_map(labels.clone());
        }
        builder
    }
}
