use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio::net::TcpListener;

use tonal::config::ServeArgs;
use tonal::{server, ClassificationService, ModelManager, Predictor};

async fn ensure_model_downloaded(args: &ServeArgs) -> anyhow::Result<()> {
    if !args.is_hub_model() || !(args.download || args.fresh) {
        return Ok(());
    }
    let manager = ModelManager::new_default()?;

    if args.fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(&args.model)?;
    }
    manager.ensure_model_downloaded(&args.model).await?;
    Ok(())
}

async fn load_predictor(args: &ServeArgs) -> anyhow::Result<Predictor> {
    ensure_model_downloaded(args)
        .await
        .context("Failed to download model")?;

    let builder = args.predictor_builder();
    let predictor = tokio::task::spawn_blocking(move || builder.build())
        .await
        .map_err(|e| anyhow!("Model loading task failed: {}", e))??;
    Ok(predictor)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = ServeArgs::parse();

    info!("=== Starting Tonal Classification Service ===");
    let service = Arc::new(ClassificationService::new(args.service_config()));

    let bound = load_predictor(&args)
        .await
        .and_then(|predictor| Ok(service.bind(Arc::new(predictor))?));
    match bound {
        Ok(()) => info!("Model '{}' loaded", args.model),
        Err(e) if args.serve_degraded => {
            error!("Model unavailable, serving degraded: {:#}", e);
            warn!("/classify will answer 503 until the process is restarted");
        }
        Err(e) => return Err(e.context(format!("Failed to load model '{}'", args.model))),
    }

    let listener = TcpListener::bind(args.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", args.bind_address()))?;
    server::serve(listener, service, shutdown_signal()).await?;

    info!("=== Service stopped ===");
    Ok(())
}
