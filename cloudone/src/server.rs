//! Supervised serve loops

use std::future::Future;
use std::io;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tonic::transport::Server;
use tracing::{error, info};

use crate::context::Services;
use crate::mux;
use crate::router::create_router;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("gRPC server error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    #[error("task failed: {0}")]
    Task(#[from] JoinError),

    #[error("{0} stopped unexpectedly")]
    Stopped(&'static str),

    #[error("shutdown requested")]
    Shutdown,
}

/// Fail-fast group of named tasks
///
/// The first task to finish, successfully or not, ends the group and every
/// other task is aborted.
#[derive(Default)]
pub struct TaskGroup {
    tasks: JoinSet<(&'static str, Result<(), ServeError>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), ServeError>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, task.await) });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the first task to finish and abort the rest
    pub async fn wait(mut self) -> Result<(), ServeError> {
        let outcome = match self.tasks.join_next().await {
            None => Ok(()),
            Some(Ok((name, Ok(())))) => Err(ServeError::Stopped(name)),
            Some(Ok((_, Err(ServeError::Shutdown)))) => Err(ServeError::Shutdown),
            Some(Ok((name, Err(e)))) => {
                error!(task = name, error = %e, "Task failed");
                Err(e)
            }
            Some(Err(e)) => Err(ServeError::Task(e)),
        };
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        outcome
    }
}

/// Serve gRPC and HTTP on `listener` until a task stops or `shutdown`
/// completes
///
/// A completed `shutdown` surfaces as [`ServeError::Shutdown`].
pub async fn serve<S>(services: Services, listener: TcpListener, shutdown: S) -> Result<(), ServeError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let (demux, grpc_incoming, http_listener) = mux::split(listener)?;

    let app = create_router(&services);
    let grpc = Server::builder().add_optional_service(
        services
            .secret_manager
            .clone()
            .map(|secret_manager| secret_manager.into_server()),
    );

    let mut group = TaskGroup::new();
    group.spawn("grpc", async move {
        grpc.serve_with_incoming(grpc_incoming).await?;
        Ok(())
    });
    group.spawn("http", async move {
        axum::serve(http_listener, app).await?;
        Ok(())
    });
    group.spawn("demux", async move {
        demux.run().await?;
        Ok(())
    });
    group.spawn("shutdown", async move {
        shutdown.await;
        Err(ServeError::Shutdown)
    });

    info!(addr = %addr, "Running CloudOne server");
    group.wait().await
}

/// Completes on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
