// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background update agent.
//!
//! Multiplexes update-engine status to local subscribers over a versioned
//! envelope protocol, replays the last known state to late joiners,
//! reconciles pushed configuration against the persisted record, and rotates
//! the server-issued target token underneath the engine's HTTP client.

pub mod agent;
pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod hub;
pub mod reconcile;
pub mod run;
pub mod store;
pub mod test_support;
pub mod transport;
