// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for subscribers.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::agent::Agent;

/// Build the axum `Router` with all agent routes.
pub fn build_router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}
