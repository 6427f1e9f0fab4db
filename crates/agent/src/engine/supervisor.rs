// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner of the live update client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use ufagent_api::{Message, Status};

use crate::credential::{AuthClient, CredentialSet};
use crate::engine::{AuthorizationGate, Authorizer, EngineContext, EngineFactory, Notifier, UpdateEngine};
use crate::error::AgentError;
use crate::hub::Hub;
use crate::reconcile::Reconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// A new client is running.
    Started,
    /// The service is disabled; no client is running.
    Disabled,
    /// No client could be built; the previous one, if any, keeps running.
    Rejected { error: AgentError, details: Vec<String> },
}

struct Live {
    engine: Box<dyn UpdateEngine>,
    http: Arc<AuthClient>,
}

/// Builds update clients from the persisted configuration and keeps at most
/// one of them running.
pub struct ClientSupervisor {
    reconciler: Arc<Reconciler>,
    factory: Arc<dyn EngineFactory>,
    hub: Arc<Hub>,
    gate: Arc<AuthorizationGate>,
    notifier: Notifier,
    http: reqwest::Client,
    live: Mutex<Option<Live>>,
    closed: AtomicBool,
}

impl ClientSupervisor {
    pub fn new(
        reconciler: Arc<Reconciler>,
        factory: Arc<dyn EngineFactory>,
        hub: Arc<Hub>,
        gate: Arc<AuthorizationGate>,
        notifier: Notifier,
        http: reqwest::Client,
    ) -> Self {
        Self {
            reconciler,
            factory,
            hub,
            gate,
            notifier,
            http,
            live: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the live client with one built from the persisted
    /// configuration.
    ///
    /// The replacement is built before the old client is touched, so a
    /// configuration that cannot back a client leaves the old one running.
    pub fn restart(&self) -> Result<RestartOutcome, AgentError> {
        let mut live = self.live.lock();
        if self.closed.load(Ordering::Acquire) {
            warn!(code = %AgentError::RestartRefused, "restart requested after shutdown");
            return Err(AgentError::RestartRefused);
        }

        let config = self.reconciler.load_persisted();
        if !config.enabled {
            if let Some(mut old) = live.take() {
                old.engine.stop();
            }
            info!("service disabled, no update client running");
            return Ok(RestartOutcome::Disabled);
        }

        if let Err(details) = config.validate() {
            return Ok(self.reject(AgentError::ConfigurationInvalid, details));
        }

        let http = Arc::new(AuthClient::new(
            self.http.clone(),
            CredentialSet::new(&config.gateway_token, &self.reconciler.effective_target_token(&config)),
            config.server_kind,
            self.reconciler.clone(),
        ));
        let context = EngineContext {
            authorizer: Authorizer::new(self.gate.clone(), config.api_mode, self.notifier.clone()),
            notifier: self.notifier.clone(),
            config_data: self.reconciler.clone(),
            http: http.clone(),
            configuration: config,
        };
        let mut engine = match self.factory.build(context) {
            Ok(engine) => engine,
            Err(e) => return Ok(self.reject(AgentError::Internal, vec![format!("{e:#}")])),
        };

        if let Some(mut old) = live.take() {
            old.engine.stop();
        }
        engine.start();
        *live = Some(Live { engine, http });
        info!("update client restarted");
        Ok(RestartOutcome::Started)
    }

    fn reject(&self, error: AgentError, details: Vec<String>) -> RestartOutcome {
        warn!(code = %error, ?details, "update client not built");
        self.hub.broadcast(&Message::from(Status::ConfigurationError { details: details.clone() }));
        RestartOutcome::Rejected { error, details }
    }

    /// Ask the live client to poll now. Returns `false` without one.
    pub fn force_ping(&self) -> bool {
        match self.live.lock().as_ref() {
            Some(live) => {
                live.engine.force_ping();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.live.lock().is_some()
    }

    /// HTTP client of the live update client.
    pub fn http(&self) -> Option<Arc<AuthClient>> {
        self.live.lock().as_ref().map(|l| Arc::clone(&l.http))
    }

    /// Stop the live client and refuse further restarts.
    pub fn shutdown(&self) {
        let mut live = self.live.lock();
        self.closed.store(true, Ordering::Release);
        if let Some(mut old) = live.take() {
            old.engine.stop();
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
