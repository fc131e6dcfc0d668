//! Runs the HTTP server and the event ingestion loop as one unit.
//!
//! Either side ending stops the other. A shutdown signal stops both
//! gracefully. If the ingestion loop gives up on the stream, the server
//! drains and the stream error is returned so the process exits non-zero
//! and gets restarted, instead of serving requests with no consumer behind
//! them.

use std::future::Future;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::adapters::events::{EventIngestionLoop, IngestionStats};
use crate::ports::StreamError;

/// Why `serve_with_ingestion` stopped other than by a shutdown signal.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("HTTP server failed: {0}")]
    Server(#[from] std::io::Error),

    #[error("Event ingestion stopped: {0}")]
    Ingestion(#[from] StreamError),

    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),
}

/// Serve `app` on `listener` while `ingestion` consumes events.
///
/// Returns the ingestion counters after `shutdown_signal` resolves and both
/// sides have stopped.
pub async fn serve_with_ingestion<S>(
    listener: TcpListener,
    app: Router,
    ingestion: EventIngestionLoop,
    shutdown_signal: S,
) -> Result<IngestionStats, ServeError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut ingestion_task = tokio::spawn(ingestion.run(shutdown_rx));

    let mut stop_serving = shutdown_tx.subscribe();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal => {}
                    _ = stop_serving.wait_for(|stop| *stop) => {}
                }
            })
            .await
    });

    tokio::select! {
        served = &mut server_task => {
            let _ = shutdown_tx.send(true);
            let ingested = ingestion_task.await;
            served??;
            Ok(ingested??)
        }
        ingested = &mut ingestion_task => {
            if let Ok(Err(e)) = &ingested {
                tracing::error!(error = %e, "Event ingestion failed, shutting down HTTP server");
            }
            let _ = shutdown_tx.send(true);
            let served = server_task.await;
            let stats = ingested??;
            served??;
            Ok(stats)
        }
    }
}
