// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fixtures and assertion helpers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use ufagent_api::Configuration;

use crate::agent::{Agent, AgentOptions};
use crate::engine::IdleEngineFactory;
use crate::store::MemoryStore;

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// A configuration that passes validation and is enabled.
pub fn sample_configuration() -> Configuration {
    Configuration {
        tenant: "acme".into(),
        controller_id: "device-1".into(),
        url: "https://updates.example.com".into(),
        ..Configuration::default()
    }
}

/// Agent over an in-memory store with the idle engine.
pub fn memory_agent() -> Arc<Agent> {
    Agent::start(
        Arc::new(MemoryStore::new()),
        Arc::new(IdleEngineFactory),
        AgentOptions { client_version: "0.0.0-test".into(), queue_capacity: 16 },
        CancellationToken::new(),
    )
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .anyhow()
}

/// Spawn an HTTP/WebSocket server on a random port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    agent: Arc<Agent>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(agent);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
