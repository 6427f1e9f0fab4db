// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level agent runner, shared by `main` and integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::agent::{Agent, AgentOptions};
use crate::config::AgentConfig;
use crate::engine::IdleEngineFactory;
use crate::store::FileStore;
use crate::transport::build_router;

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &AgentConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// A running agent with its servers bound.
///
/// Returned by [`prepare`] so callers (e.g. integration tests) can reach the
/// [`Agent`] and the bound address before waiting for shutdown.
pub struct PreparedAgent {
    pub agent: Arc<Agent>,
    /// Bound TCP address, if `--port` was given.
    pub local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
}

impl PreparedAgent {
    /// Wait for shutdown, then tear the agent down.
    pub async fn run(self) -> anyhow::Result<()> {
        self.shutdown.cancelled().await;
        self.agent.teardown().await;
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Run the agent until SIGTERM/SIGINT.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    prepare(config).await?.run().await
}

/// Open the store, start the agent, bootstrap the update client and start
/// the servers.
pub async fn prepare(config: AgentConfig) -> anyhow::Result<PreparedAgent> {
    let shutdown = CancellationToken::new();

    let store = Arc::new(FileStore::open(&config.state_file())?);
    info!("state store at {}", store.path().display());
    let startup = config.load_config_file()?;

    let agent = Agent::start(
        store,
        Arc::new(IdleEngineFactory),
        AgentOptions {
            client_version: config.client_version.clone(),
            queue_capacity: config.queue_capacity,
        },
        shutdown.clone(),
    );
    let outcome = agent.bootstrap(startup)?;
    info!(?outcome, "update client bootstrapped");

    // Spawn HTTP server
    let mut local_addr = None;
    if let Some(port) = config.port {
        let router = build_router(Arc::clone(&agent));
        let addr = format!("{}:{}", config.host, port);
        let listener = TcpListener::bind(&addr).await?;
        let bound = listener.local_addr()?;
        local_addr = Some(bound);
        info!("HTTP listening on {bound}");
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(sd.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!("HTTP server error: {e}");
            }
        });
    }

    // Spawn Unix socket server
    if let Some(ref socket_path) = config.socket {
        let router = build_router(Arc::clone(&agent));
        let path = socket_path.clone();
        // Remove stale socket
        let _ = std::fs::remove_file(&path);
        let uds_listener = tokio::net::UnixListener::bind(&path)?;
        info!("Unix socket listening on {path}");
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut make_svc = router.into_make_service();
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    accept = uds_listener.accept() => {
                        match accept {
                            Ok((stream, _)) => {
                                // IntoMakeService implements Service<T> for any T
                                let svc_future = <_ as tower::Service<_>>::call(&mut make_svc, ());
                                tokio::spawn(async move {
                                    let Ok(svc) = svc_future.await;
                                    let io = hyper_util::rt::TokioIo::new(stream);
                                    let hyper_svc = hyper_util::service::TowerToHyperService::new(svc);
                                    let _ = hyper_util::server::conn::auto::Builder::new(
                                        hyper_util::rt::TokioExecutor::new(),
                                    )
                                    .serve_connection_with_upgrades(io, hyper_svc)
                                    .await;
                                });
                            }
                            Err(e) => {
                                tracing::debug!("unix socket accept error: {e}");
                            }
                        }
                    }
                }
            }
            let _ = std::fs::remove_file(&path);
        });
    }

    // Spawn signal handler
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = sd.cancelled() => {}
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                    sd.cancel();
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT");
                    sd.cancel();
                }
            }
        });
    }

    Ok(PreparedAgent { agent, local_addr, shutdown })
}
