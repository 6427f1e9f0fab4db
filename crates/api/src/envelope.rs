// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned transport unit and the inbound command set.
//!
//! Every frame exchanged with a subscriber is an [`Envelope`]:
//! `{"kind": <tag>, "version": <major>, "payload": "<text>"}`. The payload is
//! opaque text whose shape depends on `kind` and `version`.

use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::error::DecodeError;
use crate::message::Message;

/// Protocol major version negotiated by a subscriber at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// First generation: notifications carry name and description only.
    V0,
    /// Notifications carry every field of the variant.
    V1,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 2] = [Self::V0, Self::V1];
    pub const LATEST: ProtocolVersion = Self::V1;

    pub fn code(&self) -> u32 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    /// Map a wire code to the newest version not above it.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::V0,
            _ => Self::V1,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.code())
    }
}

/// Envelope kind tags. Append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    ConfigureService,
    RegisterClient,
    UnregisterClient,
    ServiceNotification,
    AuthorizationResponse,
    ForcePing,
    CurrentServiceConfiguration,
    Sync,
}

impl Kind {
    pub fn code(&self) -> u32 {
        match self {
            Self::ConfigureService => 1,
            Self::RegisterClient => 2,
            Self::UnregisterClient => 3,
            Self::ServiceNotification => 4,
            Self::AuthorizationResponse => 5,
            Self::ForcePing => 6,
            Self::CurrentServiceConfiguration => 7,
            Self::Sync => 8,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::ConfigureService,
            2 => Self::RegisterClient,
            3 => Self::UnregisterClient,
            4 => Self::ServiceNotification,
            5 => Self::AuthorizationResponse,
            6 => Self::ForcePing,
            7 => Self::CurrentServiceConfiguration,
            8 => Self::Sync,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: u32,
    pub version: u32,
    #[serde(default)]
    pub payload: String,
}

#[derive(Serialize, Deserialize)]
struct AuthorizationPayload {
    granted: bool,
}

impl Envelope {
    pub fn new(kind: Kind, version: ProtocolVersion, payload: impl Into<String>) -> Self {
        Self { kind: kind.code(), version: version.code(), payload: payload.into() }
    }

    /// Wrap a notification in the shape `version` subscribers understand.
    pub fn notification(message: &Message, version: ProtocolVersion) -> Self {
        let payload = match version {
            ProtocolVersion::V0 => message.to_summary_value(),
            ProtocolVersion::V1 => message.to_value(),
        };
        Self::new(Kind::ServiceNotification, version, payload.to_string())
    }

    pub fn current_configuration(config: &Configuration, version: ProtocolVersion) -> Self {
        Self::new(Kind::CurrentServiceConfiguration, version, config.to_json())
    }

    pub fn kind(&self) -> Option<Kind> {
        Kind::from_code(self.kind)
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::from_code(self.version)
    }

    /// Decode a `ServiceNotification` payload.
    pub fn decode_notification(&self) -> Result<Message, DecodeError> {
        if self.kind() != Some(Kind::ServiceNotification) {
            return Err(DecodeError::UnknownKind(self.kind));
        }
        Message::from_json(&self.payload).map_err(|e| match (self.protocol_version(), e) {
            (ProtocolVersion::V0, DecodeError::InvalidFields { .. }) => {
                DecodeError::VersionMismatch { version: self.version }
            }
            (_, e) => e,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(frame: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(frame).map_err(|e| DecodeError::InvalidJson(e.to_string()))
    }
}

/// Control operation sent by a subscriber.
///
/// The reply channel is not part of the command: the transport that received
/// the envelope supplies it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RegisterClient { version: ProtocolVersion },
    UnregisterClient,
    Sync { version: ProtocolVersion },
    AuthorizationResponse { granted: bool },
    ConfigureService { configuration: Box<Configuration> },
    ForcePing,
}

impl Command {
    /// Parse an inbound envelope.
    ///
    /// Outbound kinds and unknown tags are rejected with
    /// [`DecodeError::UnknownKind`]; callers log and ignore them.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        let version = envelope.protocol_version();
        match envelope.kind() {
            Some(Kind::RegisterClient) => Ok(Self::RegisterClient { version }),
            Some(Kind::UnregisterClient) => Ok(Self::UnregisterClient),
            Some(Kind::Sync) => Ok(Self::Sync { version }),
            Some(Kind::ForcePing) => Ok(Self::ForcePing),
            Some(Kind::AuthorizationResponse) => {
                let payload: AuthorizationPayload = serde_json::from_str(&envelope.payload)
                    .map_err(|e| DecodeError::InvalidFields {
                        name: "AUTHORIZATION_RESPONSE".to_owned(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::AuthorizationResponse { granted: payload.granted })
            }
            Some(Kind::ConfigureService) => {
                let configuration = Configuration::from_json(&envelope.payload)?;
                Ok(Self::ConfigureService { configuration: Box::new(configuration) })
            }
            Some(Kind::ServiceNotification) | Some(Kind::CurrentServiceConfiguration) | None => {
                Err(DecodeError::UnknownKind(envelope.kind))
            }
        }
    }

    /// Build the envelope a subscriber sends for this command.
    pub fn to_envelope(&self, version: ProtocolVersion) -> Envelope {
        match self {
            Self::RegisterClient { version } => Envelope::new(Kind::RegisterClient, *version, ""),
            Self::UnregisterClient => Envelope::new(Kind::UnregisterClient, version, ""),
            Self::Sync { version } => Envelope::new(Kind::Sync, *version, ""),
            Self::ForcePing => Envelope::new(Kind::ForcePing, version, ""),
            Self::AuthorizationResponse { granted } => Envelope::new(
                Kind::AuthorizationResponse,
                version,
                serde_json::to_string(&AuthorizationPayload { granted: *granted })
                    .unwrap_or_default(),
            ),
            Self::ConfigureService { configuration } => {
                Envelope::new(Kind::ConfigureService, version, configuration.to_json())
            }
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
