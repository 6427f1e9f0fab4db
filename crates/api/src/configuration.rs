// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service configuration record exchanged with subscribers and persisted by
//! the agent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Default poll-retry delay in milliseconds (deprecated but still validated).
pub const DEFAULT_RETRY_DELAY_MS: i64 = 900_000;

/// Default forced-update schedule: every second of every day.
pub const DEFAULT_SCHEDULE: &str = "* * * ? * *";

/// Flavour of the remote management server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    /// Update Factory server; issues rotated target tokens.
    #[default]
    UpdateFactory,
    /// Generic hawkBit-compatible server.
    Hawkbit,
}

/// Immutable service configuration.
///
/// `PartialEq` is full equality, target attributes included. Use
/// [`Configuration::materially_eq`] to decide whether a change needs the
/// update client to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigurationWire", into = "ConfigurationWire")]
pub struct Configuration {
    pub tenant: String,
    pub controller_id: String,
    /// Deprecated; only checked for sign.
    pub retry_delay: i64,
    pub url: String,
    pub target_token: String,
    pub gateway_token: String,
    /// Interactive authorization: ask subscribers before download/update.
    pub api_mode: bool,
    pub enabled: bool,
    pub server_kind: ServerKind,
    pub target_attributes: BTreeMap<String, String>,
    pub schedule_update: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            controller_id: String::new(),
            retry_delay: DEFAULT_RETRY_DELAY_MS,
            url: String::new(),
            target_token: String::new(),
            gateway_token: String::new(),
            api_mode: true,
            enabled: true,
            server_kind: ServerKind::UpdateFactory,
            target_attributes: BTreeMap::new(),
            schedule_update: DEFAULT_SCHEDULE.to_owned(),
        }
    }
}

impl Configuration {
    /// Check the fields an update client cannot be built without.
    ///
    /// Returns every problem found, in a stable order, so the list can be
    /// reported verbatim in a `ConfigurationError` status.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.tenant.trim().is_empty() {
            problems.push("tenant is empty".to_owned());
        }
        if self.controller_id.trim().is_empty() {
            problems.push("controllerId is empty".to_owned());
        }
        if self.url.trim().is_empty() {
            problems.push("url is empty".to_owned());
        }
        if self.retry_delay < 0 {
            problems.push(format!("retryDelay must not be negative (got {})", self.retry_delay));
        }
        if self.schedule_update.trim().is_empty() {
            problems.push("scheduleUpdate is empty".to_owned());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// True when tenant, controller id or server url differ.
    ///
    /// A server-rotated target token is bound to this identity.
    pub fn identity_differs(&self, other: &Configuration) -> bool {
        self.tenant != other.tenant
            || self.controller_id != other.controller_id
            || self.url != other.url
    }

    /// Copy with target attributes cleared: the view that decides restarts.
    pub fn without_attributes(&self) -> Configuration {
        Configuration { target_attributes: BTreeMap::new(), ..self.clone() }
    }

    /// Equality ignoring target attributes.
    pub fn materially_eq(&self, other: &Configuration) -> bool {
        self.without_attributes() == other.without_attributes()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(payload).map_err(|e| DecodeError::InvalidFields {
            name: "CONFIGURATION".to_owned(),
            reason: e.to_string(),
        })
    }
}

/// JSON shape of [`Configuration`].
///
/// Older clients send `apiMode` / `enable` instead of (or next to)
/// `isApiMode` / `isEnable`; a flag is on when either spelling says so.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationWire {
    #[serde(default)]
    tenant: String,
    #[serde(default)]
    controller_id: String,
    #[serde(default = "default_retry_delay")]
    retry_delay: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    target_token: String,
    #[serde(default)]
    gateway_token: String,
    #[serde(default)]
    is_api_mode: Option<bool>,
    #[serde(default, skip_serializing)]
    api_mode: Option<bool>,
    #[serde(default)]
    is_enable: Option<bool>,
    #[serde(default, skip_serializing)]
    enable: Option<bool>,
    #[serde(default = "default_true")]
    is_update_factory_serve: bool,
    #[serde(default)]
    target_attributes: BTreeMap<String, String>,
    #[serde(default = "default_schedule")]
    schedule_update: String,
}

fn default_retry_delay() -> i64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_true() -> bool {
    true
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_owned()
}

fn normalize_flag(primary: Option<bool>, legacy: Option<bool>) -> bool {
    match (primary, legacy) {
        (None, None) => true,
        (p, l) => p.unwrap_or(false) || l.unwrap_or(false),
    }
}

impl From<ConfigurationWire> for Configuration {
    fn from(wire: ConfigurationWire) -> Self {
        Self {
            tenant: wire.tenant,
            controller_id: wire.controller_id,
            retry_delay: wire.retry_delay,
            url: wire.url,
            target_token: wire.target_token,
            gateway_token: wire.gateway_token,
            api_mode: normalize_flag(wire.is_api_mode, wire.api_mode),
            enabled: normalize_flag(wire.is_enable, wire.enable),
            server_kind: if wire.is_update_factory_serve {
                ServerKind::UpdateFactory
            } else {
                ServerKind::Hawkbit
            },
            target_attributes: wire.target_attributes,
            schedule_update: wire.schedule_update,
        }
    }
}

impl From<Configuration> for ConfigurationWire {
    fn from(config: Configuration) -> Self {
        Self {
            tenant: config.tenant,
            controller_id: config.controller_id,
            retry_delay: config.retry_delay,
            url: config.url,
            target_token: config.target_token,
            gateway_token: config.gateway_token,
            is_api_mode: Some(config.api_mode),
            api_mode: None,
            is_enable: Some(config.enabled),
            enable: None,
            is_update_factory_serve: config.server_kind == ServerKind::UpdateFactory,
            target_attributes: config.target_attributes,
            schedule_update: config.schedule_update,
        }
    }
}

#[cfg(test)]
#[path = "configuration_tests.rs"]
mod tests;
