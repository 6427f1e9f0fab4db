// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber WebSocket: one connection is one endpoint.
//!
//! Text frames carry JSON envelopes in both directions. Inbound envelopes
//! are queued for the command processor with this connection as the reply
//! channel; closing the connection unsubscribes it, and the server closes
//! the connection when the hub drops the endpoint.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};
use ufagent_api::Envelope;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::hub::{Endpoint, Inbound};

/// `GET /ws`
pub async fn ws_handler(State(agent): State<Arc<Agent>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, agent))
}

async fn handle_ws(socket: WebSocket, agent: Arc<Agent>) {
    let (endpoint, mut outbound) = agent.open_endpoint();
    let dropped = endpoint.closed();
    let reply: Arc<dyn Endpoint> = endpoint;
    let commands = agent.commands();
    let shutdown = agent.shutdown_token();
    let (mut ws_tx, mut ws_rx) = socket.split();
    debug!(endpoint = %reply.id(), "subscriber connected");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            // The hub gave up on this peer; hang up so it reconnects and resyncs.
            _ = dropped.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            envelope = outbound.recv() => {
                let Some(envelope) = envelope else { break };
                if ws_tx.send(Message::Text(envelope.to_json().into())).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            if commands.send(Inbound::new(Arc::clone(&reply), envelope)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(code = %AgentError::MalformedMessage, endpoint = %reply.id(), err = %e, "undecodable frame ignored");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    debug!(endpoint = %reply.id(), "subscriber disconnected");
    let _ = commands.send(Inbound::disconnected(reply)).await;
}
