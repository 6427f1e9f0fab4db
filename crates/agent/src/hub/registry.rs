// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use ufagent_api::{Configuration, Envelope, Message, ProtocolVersion};

use crate::error::AgentError;
use crate::hub::endpoint::{Endpoint, EndpointId, EndpointIds};

/// Last notifications broadcast to one protocol version, already encoded
/// for that version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    pub status: Option<Envelope>,
    /// Event broadcast since `status`, if any.
    pub event: Option<Envelope>,
}

impl Replay {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.event.is_none()
    }

    /// Envelopes in replay order: status first, then event.
    pub fn envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.status.iter().chain(self.event.iter())
    }

    fn record(&mut self, message: &Message, envelope: Envelope) {
        if message.is_status() {
            self.status = Some(envelope);
            self.event = None;
        } else {
            self.event = Some(envelope);
        }
    }
}

struct Subscriber {
    endpoint: Arc<dyn Endpoint>,
    version: ProtocolVersion,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<EndpointId, Subscriber>,
    replay: HashMap<ProtocolVersion, Replay>,
}

/// Subscriber set plus the per-version replay cache.
///
/// Delivery is a non-blocking hand-off, so broadcasts run entirely under the
/// registry lock: every subscriber sees broadcasts in one order, and the
/// cache always matches what the last broadcast delivered.
#[derive(Default)]
pub struct Hub {
    inner: Mutex<Inner>,
    ids: EndpointIds,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new reply endpoint.
    pub fn next_endpoint_id(&self) -> EndpointId {
        self.ids.allocate()
    }

    /// Register `endpoint`, or update the version of an existing registration.
    ///
    /// Returns `true` for a new subscriber.
    pub fn subscribe(&self, endpoint: Arc<dyn Endpoint>, version: ProtocolVersion) -> bool {
        let id = endpoint.id();
        let mut inner = self.inner.lock();
        let previous = inner.subscribers.insert(id, Subscriber { endpoint, version });
        match &previous {
            Some(prev) if prev.version != version => {
                info!(endpoint = %id, from = %prev.version, to = %version, "subscriber changed version");
            }
            Some(_) => debug!(endpoint = %id, "subscriber re-registered"),
            None => info!(endpoint = %id, %version, "subscriber registered"),
        }
        previous.is_none()
    }

    /// Remove `id`. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: EndpointId) -> bool {
        let removed = self.inner.lock().subscribers.remove(&id).is_some();
        if removed {
            info!(endpoint = %id, "subscriber unregistered");
        }
        removed
    }

    pub fn is_subscribed(&self, id: EndpointId) -> bool {
        self.inner.lock().subscribers.contains_key(&id)
    }

    pub fn version_of(&self, id: EndpointId) -> Option<ProtocolVersion> {
        self.inner.lock().subscribers.get(&id).map(|s| s.version)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Deliver `message` to every subscriber in its negotiated version and
    /// record it in the replay cache of every version.
    ///
    /// Subscribers whose delivery fails are removed; the rest still receive
    /// the message. Returns the number of successful deliveries.
    pub fn broadcast(&self, message: &Message) -> usize {
        let encoded: HashMap<ProtocolVersion, Envelope> = ProtocolVersion::ALL
            .iter()
            .map(|v| (*v, Envelope::notification(message, *v)))
            .collect();

        let mut inner = self.inner.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sub) in &inner.subscribers {
            let Some(envelope) = encoded.get(&sub.version) else {
                continue;
            };
            match sub.endpoint.deliver(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        code = %AgentError::DeadEndpoint,
                        endpoint = %id,
                        err = %e,
                        message = %message.name(),
                        "delivery failed, dropping subscriber"
                    );
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            if let Some(sub) = inner.subscribers.remove(&id) {
                sub.endpoint.close();
            }
        }
        for (version, envelope) in encoded {
            inner.replay.entry(version).or_default().record(message, envelope);
        }
        debug!(message = %message.name(), delivered, "broadcast");
        delivered
    }

    /// Cached notifications for `version`, or `None` before the first
    /// broadcast.
    pub fn sync(&self, version: ProtocolVersion) -> Option<Replay> {
        self.inner.lock().replay.get(&version).filter(|r| !r.is_empty()).cloned()
    }

    pub fn has_cached(&self, version: ProtocolVersion) -> bool {
        self.inner.lock().replay.get(&version).is_some_and(|r| !r.is_empty())
    }

    /// Resynchronize one endpoint: current configuration, then the cached
    /// status and event for `version`.
    ///
    /// Runs under the registry lock like [`Hub::broadcast`], so a concurrent
    /// broadcast reaches the endpoint after the replay, never before it.
    /// The endpoint need not be subscribed. If delivery fails it is removed
    /// and closed. Returns the number of envelopes delivered.
    pub fn resync(
        &self,
        endpoint: &dyn Endpoint,
        version: ProtocolVersion,
        configuration: &Configuration,
    ) -> usize {
        let mut inner = self.inner.lock();
        let replay = inner.replay.get(&version).cloned().unwrap_or_default();
        let frames = std::iter::once(Envelope::current_configuration(configuration, version))
            .chain(replay.envelopes().cloned());

        let mut sent = 0;
        for envelope in frames {
            if let Err(e) = endpoint.deliver(envelope) {
                warn!(code = %AgentError::DeadEndpoint, endpoint = %endpoint.id(), err = %e, "sync delivery failed");
                if inner.subscribers.remove(&endpoint.id()).is_some() {
                    info!(endpoint = %endpoint.id(), "subscriber unregistered");
                }
                endpoint.close();
                break;
            }
            sent += 1;
        }
        debug!(endpoint = %endpoint.id(), %version, sent, "synced");
        sent
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
