// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure classes handled inside the agent.
///
/// None of these cross the IPC boundary as errors: subscribers only ever see
/// their effects as status and event notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentError {
    /// Inbound payload could not be decoded; dropped.
    MalformedMessage,
    /// Delivery to a subscriber failed; the subscriber was removed.
    DeadEndpoint,
    /// Configuration cannot back an update client; reported as a status.
    ConfigurationInvalid,
    /// Client rebuild was requested after the supervisor shut down.
    RestartRefused,
    Internal,
}

impl AgentError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedMessage => "MALFORMED_MESSAGE",
            Self::DeadEndpoint => "DEAD_ENDPOINT",
            Self::ConfigurationInvalid => "CONFIGURATION_INVALID",
            Self::RestartRefused => "RESTART_REFUSED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for AgentError {}
