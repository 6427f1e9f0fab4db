// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ufagent_api::{Command, Envelope, Kind, ProtocolVersion};

use crate::engine::{AuthorizationGate, ClientSupervisor};
use crate::error::AgentError;
use crate::hub::endpoint::Endpoint;
use crate::hub::registry::Hub;
use crate::reconcile::Reconciler;

/// An envelope received from a subscriber, with the channel to reply on.
pub struct Inbound {
    pub reply: Arc<dyn Endpoint>,
    pub envelope: Envelope,
}

impl Inbound {
    pub fn new(reply: Arc<dyn Endpoint>, envelope: Envelope) -> Self {
        Self { reply, envelope }
    }

    /// The transport lost the peer behind `reply`.
    pub fn disconnected(reply: Arc<dyn Endpoint>) -> Self {
        let envelope = Envelope::new(Kind::UnregisterClient, ProtocolVersion::LATEST, "");
        Self { reply, envelope }
    }
}

/// Applies inbound commands one at a time, in arrival order.
pub struct CommandProcessor {
    hub: Arc<Hub>,
    reconciler: Arc<Reconciler>,
    supervisor: Arc<ClientSupervisor>,
    gate: Arc<AuthorizationGate>,
}

impl CommandProcessor {
    pub fn new(
        hub: Arc<Hub>,
        reconciler: Arc<Reconciler>,
        supervisor: Arc<ClientSupervisor>,
        gate: Arc<AuthorizationGate>,
    ) -> Self {
        Self { hub, reconciler, supervisor, gate }
    }

    /// Drain `rx` until it closes or `shutdown` fires.
    pub async fn run(self, mut rx: mpsc::Receiver<Inbound>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(inbound) => self.handle(inbound).await,
                    None => break,
                },
            }
        }
        debug!("command processor stopped");
    }

    pub async fn handle(&self, inbound: Inbound) {
        let Inbound { reply, envelope } = inbound;
        let command = match Command::from_envelope(&envelope) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    code = %AgentError::MalformedMessage,
                    endpoint = %reply.id(),
                    kind = envelope.kind,
                    err = %e,
                    "inbound envelope ignored"
                );
                return;
            }
        };
        debug!(endpoint = %reply.id(), kind = envelope.kind, "command");

        match command {
            Command::RegisterClient { version } => {
                self.hub.subscribe(reply, version);
            }
            Command::UnregisterClient => {
                self.hub.unsubscribe(reply.id());
            }
            Command::Sync { version } => {
                let configuration = self.reconciler.load_persisted();
                self.hub.resync(&*reply, version, &configuration);
            }
            Command::AuthorizationResponse { granted } => {
                if !self.gate.resolve(granted) {
                    info!(granted, "authorization response with no pending request");
                }
            }
            Command::ConfigureService { configuration } => self.configure(*configuration).await,
            Command::ForcePing => {
                if !self.supervisor.force_ping() {
                    info!("force ping ignored, no update client running");
                }
            }
        }
    }

    /// Persist `configuration` and rebuild the client if needed.
    ///
    /// Store commits and client construction block, so they run on the
    /// blocking pool; the next command waits for them.
    async fn configure(&self, configuration: ufagent_api::Configuration) {
        let reconciler = Arc::clone(&self.reconciler);
        let supervisor = Arc::clone(&self.supervisor);
        let applied = tokio::task::spawn_blocking(move || {
            let decision = reconciler.reconcile(&configuration)?;
            if decision.restart {
                // Refusal is logged by the supervisor.
                let _ = supervisor.restart();
            }
            anyhow::Ok(())
        })
        .await;
        match applied {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "failed to persist configuration"),
            Err(e) => warn!(code = %AgentError::Internal, err = %e, "configuration task failed"),
        }
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
