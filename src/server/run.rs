use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::channel::{LoggingHandler, NotificationListener};
use crate::config::Settings;
use crate::redis::BackoffConfig;
use crate::store::BackingStore;

use super::{create_app, AppState};

/// Serve the API on a connected store until `shutdown` resolves.
///
/// The listener task is stopped and joined and the store closed on every
/// exit path, including a failed bind or a server error; that error is
/// returned afterwards.
pub async fn run_until<F>(
    settings: Settings,
    store: Arc<dyn BackingStore>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = settings.server_addr();
    let state = AppState::new(settings.clone(), store.clone());
    tracing::info!(queue_order = ?state.broker.queue_order(), "Application state initialized");

    // Start notification listener in background
    let listener = settings.listener.enabled.then(|| {
        Arc::new(
            NotificationListener::new(state.channel.clone())
                .with_backoff(BackoffConfig::from(&settings.redis))
                .with_handler_timeout(Duration::from_millis(settings.listener.handler_timeout_ms))
                .with_handler(Arc::new(LoggingHandler)),
        )
    });
    let listener_handle = listener.clone().map(|listener| {
        tokio::spawn(async move {
            if let Err(e) = listener.start().await {
                tracing::error!(error = %e, "Notification listener failed");
            }
        })
    });

    let served = serve(state, &addr, shutdown).await;
    if let Err(e) = &served {
        tracing::error!(address = %addr, error = %e, "HTTP server failed");
    }

    if let Some(listener) = &listener {
        listener.stop();
    }
    if let Some(handle) = listener_handle {
        let _ = handle.await;
    }
    store.close().await;

    tracing::info!("Server shutdown complete");
    served
}

async fn serve<F>(state: AppState, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);

    let tcp_listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn local_settings(port: u16) -> Settings {
        let mut settings = Settings::default();
        settings.server.host = "127.0.0.1".to_string();
        settings.server.port = port;
        settings
    }

    #[tokio::test]
    async fn test_bind_failure_still_closes_store() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();

        let result = run_until(local_settings(port), store.clone(), std::future::pending::<()>()).await;
        assert!(result.is_err());
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_store() {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();

        let result = run_until(local_settings(0), store.clone(), async {}).await;
        assert!(result.is_ok());
        assert!(!store.is_connected());
    }
}
