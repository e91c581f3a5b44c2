mod handlers;
mod metrics;
mod routes;
mod store;

use anyhow::{Context, Result};
use axum::Router;
use pulse_common::config::SandboxConfig;
use pulse_sandbox::{DockerManager, Sandbox};
use std::sync::Arc;
use store::{InMemorySubmissionStore, SubmissionStore};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub sandbox: Sandbox,
    pub store: Arc<dyn SubmissionStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("CodePulse API booting...");

    let config = SandboxConfig::from_env();
    info!(
        memory_limit_mb = config.memory_limit_bytes / (1024 * 1024),
        cpu_limit = config.cpu_limit,
        timeout_secs = config.execution_timeout.as_secs(),
        tag_policy = ?config.tag_policy,
        "Sandbox configuration loaded"
    );

    // One client for the lifetime of the process
    let docker = DockerManager::connect_local().context("Failed to create Docker client")?;
    match docker.ping().await {
        Ok(()) => info!("Connected to Docker daemon"),
        Err(e) => warn!(error = %e, "Docker daemon not reachable; executions will fail until it is"),
    }

    let state = Arc::new(AppState {
        sandbox: Sandbox::new(Arc::new(docker), config),
        store: Arc::new(InMemorySubmissionStore::new()),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = std::env::var("PULSE_API_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
