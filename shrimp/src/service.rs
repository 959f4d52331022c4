//! Service wiring: worker pool, manager task, and HTTP server.

use crate::config::{AppConfig, ConfigError};
use crate::http::{self, AppState};
use crate::manager::{ManagerConfig, TransformManager};
use crate::worker::TransformWorker;
use std::net::SocketAddr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors that can take the service down.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Server(std::io::Error),
}

/// Run the service until the token is cancelled.
///
/// Spawns the transformer workers on their own threads, the manager on
/// its own task, and serves HTTP on the caller's runtime. Returns once
/// the HTTP server has shut down; worker threads exit when the manager
/// (the sole owner of their job channels) goes away.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<(), ServiceError> {
    config.validate()?;
    let addr = config.bind_addr()?;
    let root_dir = config.storage.root_dir.clone();

    let mut worker_handles = Vec::with_capacity(config.runtime.worker_threads);
    for id in 0..config.runtime.worker_threads {
        let (handle, _join) =
            TransformWorker::spawn(id, root_dir.clone()).map_err(ServiceError::WorkerSpawn)?;
        worker_handles.push(handle);
    }

    let (manager, manager_tx) = TransformManager::new(ManagerConfig::default(), worker_handles);
    tokio::spawn(manager.run(shutdown.clone()));

    let app = http::router(AppState::new(manager_tx, root_dir));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind { addr, source })?;

    info!(
        address = %addr,
        io_threads = config.runtime.io_threads,
        worker_threads = config.runtime.worker_threads,
        images_root = %config.storage.root_dir.display(),
        "shrimp is listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServiceError::Server)?;

    Ok(())
}
