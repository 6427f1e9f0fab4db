// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::agent::Agent;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub subscriber_count: usize,
    pub client_running: bool,
}

/// `GET /api/v1/health`
pub async fn health(State(agent): State<Arc<Agent>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        subscriber_count: agent.hub.subscriber_count(),
        client_running: agent.supervisor.is_running(),
    })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
