// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `ufagent` binary and exercise
//! HTTP, WebSocket, and Unix socket transports.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use ufagent_api::{Command, Configuration, Envelope, Kind, Message, ProtocolVersion, Status};
use ufagent_specs::AgentProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

fn configuration() -> Configuration {
    Configuration {
        tenant: "acme".into(),
        controller_id: "smoke-device".into(),
        url: "https://updates.example.com".into(),
        ..Configuration::default()
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn ws_send(ws: &mut WsStream, command: &Command) -> anyhow::Result<()> {
    let text = command.to_envelope(ProtocolVersion::V1).to_json();
    ws.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

async fn ws_recv(ws: &mut WsStream) -> anyhow::Result<Envelope> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("ws closed"))??;
        if let WsMessage::Text(text) = msg {
            return Ok(Envelope::from_json(&text)?);
        }
    }
}

// -- HTTP (TCP) ---------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", agent.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["subscriber_count"], 0);
    assert_eq!(resp["client_running"], false);

    Ok(())
}

#[tokio::test]
async fn config_file_starts_client() -> anyhow::Result<()> {
    let agent = AgentProcess::build().configuration(configuration()).spawn()?;
    agent.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", agent.base_url())).await?.json().await?;
    assert_eq!(resp["client_running"], true);

    Ok(())
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn ws_register_configure_sync() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(&agent.ws_url()).await?;
    ws_send(&mut ws, &Command::RegisterClient { version: ProtocolVersion::V1 }).await?;
    ws_send(&mut ws, &Command::ConfigureService { configuration: Box::new(configuration()) })
        .await?;
    assert_eq!(ws_recv(&mut ws).await?.decode_notification()?, Message::Status(Status::Idle));

    ws_send(&mut ws, &Command::Sync { version: ProtocolVersion::V1 }).await?;
    let current = ws_recv(&mut ws).await?;
    assert_eq!(current.kind(), Some(Kind::CurrentServiceConfiguration));
    assert_eq!(Configuration::from_json(&current.payload)?.controller_id, "smoke-device");
    assert_eq!(ws_recv(&mut ws).await?.decode_notification()?, Message::Status(Status::Idle));

    Ok(())
}

#[tokio::test]
async fn configuration_survives_restart() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(&agent.ws_url()).await?;
    ws_send(&mut ws, &Command::RegisterClient { version: ProtocolVersion::V1 }).await?;
    ws_send(&mut ws, &Command::ConfigureService { configuration: Box::new(configuration()) })
        .await?;
    ws_recv(&mut ws).await?;
    drop(ws);

    let state_dir = agent.into_state_dir()?;
    let agent = AgentProcess::build().state_dir(state_dir).spawn()?;
    agent.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(&agent.ws_url()).await?;
    ws_send(&mut ws, &Command::Sync { version: ProtocolVersion::V1 }).await?;
    let current = ws_recv(&mut ws).await?;
    assert_eq!(current.kind(), Some(Kind::CurrentServiceConfiguration));
    assert_eq!(Configuration::from_json(&current.payload)?.tenant, "acme");

    Ok(())
}

// -- Unix socket --------------------------------------------------------------

#[tokio::test]
async fn unix_socket_health() -> anyhow::Result<()> {
    let agent = AgentProcess::build().no_tcp().socket().spawn()?;
    agent.wait_healthy(TIMEOUT).await?;

    let socket_path = agent.socket_path().ok_or_else(|| anyhow::anyhow!("no socket"))?;
    let body = ufagent_specs::unix_http_get(socket_path, "/api/v1/health").await?;
    let resp: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(resp["status"], "running");

    Ok(())
}

// -- Lifecycle ----------------------------------------------------------------

#[tokio::test]
async fn sigterm_exits_cleanly() -> anyhow::Result<()> {
    let mut agent = AgentProcess::build().configuration(configuration()).spawn()?;
    agent.wait_healthy(TIMEOUT).await?;

    agent.terminate()?;
    let status = agent.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status}");

    Ok(())
}
