//! Client Credential Server
//!
//! Single-binary Rust service that:
//! 1. Loads configuration and secrets (env first, then files)
//! 2. Opens the configured credential store (memory, file or postgres)
//! 3. Seeds the bootstrap administrator when configured
//! 4. Serves the token issue / verify / revoke and client registration API

mod config;
mod error;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use credential_core::{
    CredentialService, CredentialStore, FileStore, MemoryStore, NewClient, PgStore,
    ServiceConfig, TokenCodec,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, StoreBackend, StoreConfig};
use crate::routes::{AppState, build_router};

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting credential-server");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        store = ?config.store.backend,
        ttl_secs = config.tokens.ttl_secs,
        bootstrap = config.bootstrap.is_some(),
        "configuration loaded"
    );

    let signing_secret = config
        .tokens
        .signing_secret
        .as_ref()
        .context("signing secret missing")?;
    let codec = TokenCodec::new(signing_secret.expose().as_bytes())
        .context("invalid signing secret")?;

    let store = open_store(&config.store).await?;
    let service = CredentialService::new(
        store,
        codec,
        ServiceConfig {
            token_ttl: config.tokens.ttl(),
            store_timeout: config.store.timeout(),
        },
    );

    if let Some(bootstrap) = &config.bootstrap {
        let secret = bootstrap
            .admin_secret
            .clone()
            .context("bootstrap admin secret missing")?;
        service
            .bootstrap_client(NewClient {
                client_id: bootstrap.admin_client_id.clone(),
                secret,
                is_admin: true,
            })
            .await
            .context("failed to seed bootstrap administrator")?;
    }

    let app = build_router(
        AppState::new(service, prometheus_handle),
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires: the server is
    // told to drain, then the drain races DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Open the configured store adapter.
///
/// Postgres migrations run before the first request is accepted.
async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CredentialStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("memory store selected: clients and revocations are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::File => {
            let path = config.path.clone().context("store.path missing")?;
            let store = FileStore::load(path.clone())
                .await
                .with_context(|| format!("failed to open store file {}", path.display()))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_ref()
                .context("database URL missing")?;
            let store = PgStore::connect(url, config.max_connections, config.timeout())
                .await
                .context("failed to connect to postgres")?;
            store
                .migrate()
                .await
                .context("failed to run store migrations")?;
            Ok(Arc::new(store))
        }
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config(backend: StoreBackend, path: Option<std::path::PathBuf>) -> StoreConfig {
        StoreConfig {
            backend,
            path,
            database_url_file: None,
            database_url: None,
            max_connections: 1,
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn open_memory_store() {
        let store = open_store(&store_config(StoreBackend::Memory, None))
            .await
            .unwrap();
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn open_file_store_creates_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");
        let store = open_store(&store_config(StoreBackend::File, Some(path.clone())))
            .await
            .unwrap();
        assert_eq!(store.backend(), "file");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn open_postgres_without_url_fails() {
        let result = open_store(&store_config(StoreBackend::Postgres, None)).await;
        assert!(result.is_err());
    }
}
