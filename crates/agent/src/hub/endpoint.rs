// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ufagent_api::Envelope;

/// Identity of a subscriber's reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Hands out endpoint ids unique for the lifetime of the allocator.
#[derive(Debug, Default)]
pub struct EndpointIds {
    next: AtomicU64,
}

impl EndpointIds {
    pub fn allocate(&self) -> EndpointId {
        EndpointId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The peer hung up.
    Closed,
    /// The peer stopped draining its queue.
    Full,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("peer closed"),
            Self::Full => f.write_str("peer queue full"),
        }
    }
}

/// A subscriber's reply channel.
///
/// `deliver` must not block or retry: a failure is final for this delivery
/// and the hub drops the endpoint, then calls `close`.
pub trait Endpoint: Send + Sync {
    fn id(&self) -> EndpointId;
    fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryError>;

    /// Tell the transport the hub dropped this endpoint.
    fn close(&self) {}
}

/// Endpoint backed by a bounded tokio channel; the transport drains the
/// receiving half into the peer connection.
#[derive(Debug, Clone)]
///
/// When the hub drops the endpoint, the `closed` token fires so the
/// transport can hang up on the peer.
pub struct ChannelEndpoint {
    id: EndpointId,
    tx: mpsc::Sender<Envelope>,
    closed: CancellationToken,
}

impl ChannelEndpoint {
    pub fn new(id: EndpointId, capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx, closed: CancellationToken::new() }, rx)
    }

    /// Cancelled once the hub has dropped this endpoint.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Endpoint for ChannelEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
