// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent context: every long-lived component, wired together once and
//! torn down explicitly.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ufagent_api::{Configuration, Envelope, Message};

use crate::credential::install_crypto_provider;
use crate::engine::{AuthorizationGate, ClientSupervisor, EngineFactory, Notifier, RestartOutcome};
use crate::hub::{ChannelEndpoint, CommandProcessor, Hub, Inbound};
use crate::reconcile::{DeviceIdentity, Reconciler};
use crate::store::Store;

/// Inbound commands buffered ahead of the processor.
const COMMAND_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub client_version: String,
    /// Outbound frames buffered per subscriber.
    pub queue_capacity: usize,
}

pub struct Agent {
    pub hub: Arc<Hub>,
    pub reconciler: Arc<Reconciler>,
    pub supervisor: Arc<ClientSupervisor>,
    pub gate: Arc<AuthorizationGate>,
    commands: mpsc::Sender<Inbound>,
    queue_capacity: usize,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Wire the components and spawn the command processor and the
    /// notification pump. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn Store>,
        factory: Arc<dyn EngineFactory>,
        options: AgentOptions,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        install_crypto_provider();

        let hub = Arc::new(Hub::new());
        let reconciler =
            Arc::new(Reconciler::new(store, DeviceIdentity::detect(&options.client_version)));
        let gate = Arc::new(AuthorizationGate::new());
        let (notifier, notifications) = Notifier::channel();
        let http = reqwest::Client::builder()
            .user_agent(concat!("ufagent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        let supervisor = Arc::new(ClientSupervisor::new(
            reconciler.clone(),
            factory,
            hub.clone(),
            gate.clone(),
            notifier,
            http,
        ));

        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let processor =
            CommandProcessor::new(hub.clone(), reconciler.clone(), supervisor.clone(), gate.clone());
        let tasks = vec![
            tokio::spawn(processor.run(command_rx, shutdown.clone())),
            tokio::spawn(pump(hub.clone(), notifications, shutdown.clone())),
        ];

        Arc::new(Self {
            hub,
            reconciler,
            supervisor,
            gate,
            commands,
            queue_capacity: options.queue_capacity,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    /// Apply the startup configuration, if any, then build the first client
    /// from whatever is persisted.
    pub fn bootstrap(&self, startup: Option<Configuration>) -> anyhow::Result<RestartOutcome> {
        if let Some(config) = startup {
            let decision = self.reconciler.reconcile(&config)?;
            info!(persisted = decision.persist, "startup configuration applied");
        }
        Ok(self.supervisor.restart()?)
    }

    /// Queue for inbound commands.
    pub fn commands(&self) -> mpsc::Sender<Inbound> {
        self.commands.clone()
    }

    /// Create a reply endpoint for a new peer connection.
    pub fn open_endpoint(&self) -> (Arc<ChannelEndpoint>, mpsc::Receiver<Envelope>) {
        let (endpoint, rx) = ChannelEndpoint::new(self.hub.next_endpoint_id(), self.queue_capacity);
        (Arc::new(endpoint), rx)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the update client and the background tasks.
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        self.supervisor.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("agent stopped");
    }
}

/// Forward engine notifications to the hub.
async fn pump(
    hub: Arc<Hub>,
    mut notifications: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = notifications.recv() => match next {
                Some(message) => {
                    hub.broadcast(&message);
                }
                None => break,
            },
        }
    }
    debug!("notification pump stopped");
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
