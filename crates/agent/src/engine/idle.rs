// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine that never finds an update.
//!
//! Used until a server-specific engine is plugged in; it keeps the
//! notification path alive so subscribers can be developed against the agent.

use tracing::info;
use ufagent_api::{Event, Status};

use crate::engine::{EngineContext, EngineFactory, Notifier, UpdateEngine};

pub struct IdleEngine {
    controller_id: String,
    notifier: Notifier,
    running: bool,
}

impl IdleEngine {
    pub fn new(context: EngineContext) -> Self {
        Self {
            controller_id: context.configuration.controller_id,
            notifier: context.notifier,
            running: false,
        }
    }
}

impl UpdateEngine for IdleEngine {
    fn start(&mut self) {
        self.running = true;
        info!(controller_id = %self.controller_id, "update client started");
        self.notifier.notify(Status::Idle);
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            info!(controller_id = %self.controller_id, "update client stopped");
        }
    }

    fn force_ping(&self) {
        if !self.running {
            return;
        }
        self.notifier.notify(Event::Polling);
        self.notifier.notify(Status::Idle);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdleEngineFactory;

impl EngineFactory for IdleEngineFactory {
    fn build(&self, context: EngineContext) -> anyhow::Result<Box<dyn UpdateEngine>> {
        Ok(Box::new(IdleEngine::new(context)))
    }
}
