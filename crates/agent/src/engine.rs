// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam between the agent and the update engine that talks to the server.
//!
//! An engine is built from an [`EngineContext`] by an [`EngineFactory`] each
//! time the supervisor (re)creates the update client. The engine reports
//! progress through the [`Notifier`] and asks for user consent through the
//! [`Authorizer`].

pub mod idle;
pub mod supervisor;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use ufagent_api::{Configuration, Message, Status};

use crate::credential::AuthClient;

pub use idle::{IdleEngine, IdleEngineFactory};
pub use supervisor::{ClientSupervisor, RestartOutcome};

/// Target attributes the engine reports to the server.
pub trait ConfigDataProvider: Send + Sync {
    /// Attributes to upload, device identity included.
    fn config_data(&self) -> BTreeMap<String, String>;

    /// True when the server already has the current attributes.
    fn is_updated(&self) -> bool;

    /// Record that the current attributes were accepted by the server.
    fn on_config_data_update(&self);
}

/// A running update client.
pub trait UpdateEngine: Send {
    fn start(&mut self);
    fn stop(&mut self);
    /// Poll the server now instead of waiting for the next scheduled poll.
    fn force_ping(&self);
}

pub trait EngineFactory: Send + Sync {
    fn build(&self, context: EngineContext) -> anyhow::Result<Box<dyn UpdateEngine>>;
}

/// Everything an engine needs from the agent.
pub struct EngineContext {
    pub configuration: Configuration,
    pub http: Arc<AuthClient>,
    pub config_data: Arc<dyn ConfigDataProvider>,
    pub authorizer: Authorizer,
    pub notifier: Notifier,
}

/// Non-blocking producer side of the notification queue.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Message>,
}

impl Notifier {
    /// Create a notifier and the receiver a pump drains into the hub.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `message` for broadcast. Dropped once the agent has shut down.
    pub fn notify(&self, message: impl Into<Message>) {
        let message = message.into();
        if self.tx.send(message).is_err() {
            debug!("notification dropped after shutdown");
        }
    }
}

/// What an engine is asking consent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationKind {
    Download,
    Update,
}

impl AuthorizationKind {
    fn waiting_status(&self) -> Status {
        match self {
            Self::Download => Status::WaitingDownloadAuthorization,
            Self::Update => Status::WaitingUpdateAuthorization,
        }
    }
}

/// Single pending consent request, resolved by a subscriber's
/// `AuthorizationResponse`.
#[derive(Debug, Default)]
pub struct AuthorizationGate {
    pending: Mutex<Option<oneshot::Sender<bool>>>,
}

impl AuthorizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request. A request still pending is denied.
    pub fn open(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.pending.lock().replace(tx) {
            debug!("superseding pending authorization request");
            let _ = previous.send(false);
        }
        rx
    }

    /// Resolve the pending request. Returns `false` if none was pending.
    pub fn resolve(&self, granted: bool) -> bool {
        match self.pending.lock().take() {
            Some(tx) => {
                info!(granted, "authorization response");
                tx.send(granted).is_ok()
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Consent helper handed to engines.
#[derive(Debug, Clone)]
pub struct Authorizer {
    gate: Arc<AuthorizationGate>,
    interactive: bool,
    notifier: Notifier,
}

impl Authorizer {
    pub fn new(gate: Arc<AuthorizationGate>, interactive: bool, notifier: Notifier) -> Self {
        Self { gate, interactive, notifier }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Ask for consent. Non-interactive configurations grant immediately;
    /// otherwise subscribers are told to ask the user and the answer is
    /// awaited. A superseded or abandoned request counts as denied.
    pub async fn request(&self, kind: AuthorizationKind) -> bool {
        if !self.interactive {
            return true;
        }
        let answer = self.gate.open();
        self.notifier.notify(kind.waiting_status());
        answer.await.unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
