//! Run-control HTTP surface.
//!
//! | Route                         | Handler                                  |
//! |-------------------------------|------------------------------------------|
//! | `POST /run`                   | start a run from a local source path     |
//! | `POST /run-upload`            | start a run from an uploaded source      |
//! | `GET  /runs`                  | list runs                                |
//! | `GET  /stream/{run_id}`       | live log as server-sent events           |
//! | `GET  /status/{run_id}`       | status plus artifact flags               |
//! | `GET  /download/{run_id}`     | output archive                           |
//! | `GET  /download-last/{run_id}`| most recently written output file        |
//! | `POST /stop/{run_id}`         | request a stop                           |
//! | `GET  /health`                | liveness                                 |

pub mod api;
pub mod stream;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::run::{Notifier, RunRegistry, Supervisor, WorkerCommand, supervisor::DEFAULT_STOP_GRACE};
use api::AppState;
pub use stream::DEFAULT_POLL_INTERVAL;

/// Configuration for the run-control server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub outputs_dir: PathBuf,
    pub cors: bool,
    pub worker: WorkerCommand,
    pub stop_grace: Duration,
    pub poll_interval: Duration,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl ServerConfig {
    pub fn new(worker: WorkerCommand) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            outputs_dir: PathBuf::from("outputs"),
            cors: true,
            worker,
            stop_grace: DEFAULT_STOP_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            notifier: None,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, cors: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the run-control server and block until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    serve(listener, config, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves.
///
/// Runs still in progress are stopped before the listener drains, so open
/// log streams reach a terminal status and close on their own.
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    std::fs::create_dir_all(&config.outputs_dir).with_context(|| {
        format!(
            "Failed to create outputs directory {}",
            config.outputs_dir.display()
        )
    })?;

    let mut supervisor = Supervisor::new(RunRegistry::new(), config.worker, &config.outputs_dir)
        .with_stop_grace(config.stop_grace);
    if let Some(notifier) = config.notifier {
        supervisor = supervisor.with_notifier(notifier);
    }

    let state = Arc::new(AppState {
        supervisor: supervisor.clone(),
        poll_interval: config.poll_interval,
    });
    let app = build_router(state, config.cors);

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, outputs = %config.outputs_dir.display(), "checkup server listening");

    let stop_runs = async move {
        shutdown.await;
        supervisor.shutdown().await;
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_runs)
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
