use anyhow::{Context, Result};
use facesim_core::OnnxFaceExtractor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod form;
mod http_interface;
mod scratch;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facesimd starting");

    let config = config::Config::load()?;
    tracing::info!(?config, "configuration loaded");

    // Models load once, up front; a missing model aborts startup.
    let extractor = OnnxFaceExtractor::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(extractor, config.similarity_threshold, config.queue_depth)?;

    let state = http_interface::AppState {
        engine,
        scratch_root: Arc::new(config.scratch_dir.clone()),
    };
    let app = http_interface::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "facesimd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facesimd shutting down");
    Ok(())
}

/// Resolves on ctrl-c. If the handler cannot be installed the server keeps
/// running instead of shutting down at once.
async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

async fn wait_for_signal(signal: impl std::future::Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "failed to install ctrl-c handler; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}
