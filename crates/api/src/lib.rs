// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber-facing contract of the update agent.
//!
//! Everything a subscriber process needs to talk to the agent lives here:
//! the status/event message model, the versioned envelope that carries it,
//! the inbound command set, and the service configuration record. The agent
//! crate depends on this one; subscribers can depend on it alone.

pub mod configuration;
pub mod envelope;
pub mod error;
pub mod message;

pub use configuration::{Configuration, ServerKind};
pub use envelope::{Command, Envelope, Kind, ProtocolVersion};
pub use error::DecodeError;
pub use message::{Artifact, Event, Message, MessageName, Status};
