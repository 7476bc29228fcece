use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use clog_stream::SharedChangeStream;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Change log HTTP server.
pub struct ClogServer {
    config: ServerConfig,
    stream: Arc<SharedChangeStream>,
}

impl ClogServer {
    /// Open the stream described by `config`.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let stream = config.open_stream()?;
        Ok(Self { config, stream })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stream(&self) -> &Arc<SharedChangeStream> {
        &self.stream
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(
            Arc::clone(&self.stream),
            Duration::from_millis(self.config.long_poll_max_ms),
        ))
    }

    /// Serve until Ctrl-C, then close the stream.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then close the stream.
    pub async fn serve_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            data_dir = ?self.config.data_dir,
            "change log server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        self.stream.close()?;
        tracing::info!("change log server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = ClogServer::open(ServerConfig::default()).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:7070".parse().unwrap());
        assert_eq!(server.stream().next_offset(), 0);
    }

    #[test]
    fn router_builds() {
        let server = ClogServer::open(ServerConfig::default()).unwrap();
        let _router = server.router();
    }

    #[tokio::test]
    async fn shutdown_closes_the_stream() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        let server = ClogServer::open(config).unwrap();
        let stream = Arc::clone(server.stream());
        server.serve_until(async {}).await.unwrap();
        assert!(stream.is_closed());
    }
}
