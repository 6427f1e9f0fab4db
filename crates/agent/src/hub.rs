// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber registry, broadcast fan-out and inbound command processing.
//!
//! Subscribers register a reply endpoint and the protocol version they speak.
//! The update engine's notifications are encoded once per version and fanned
//! out to every endpoint; the latest status and event per version are kept
//! so a late joiner can resynchronize without waiting for the next change.

pub mod endpoint;
pub mod processor;
pub mod registry;

pub use endpoint::{ChannelEndpoint, DeliveryError, Endpoint, EndpointId};
pub use processor::{CommandProcessor, Inbound};
pub use registry::{Hub, Replay};
