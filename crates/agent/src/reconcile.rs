// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration reconciliation against the persisted record.
//!
//! The reconciler owns every store key. The configuration is written as one
//! batch so a concurrent reader never sees half a record. The server-issued
//! target token lives in its own slot and is dropped whenever the device
//! identity (tenant, controller id, url) changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use ufagent_api::{Configuration, ServerKind};

use crate::credential::TokenRotationListener;
use crate::engine::ConfigDataProvider;
use crate::store::{Batch, Store};

pub const KEY_TENANT: &str = "tenant";
pub const KEY_CONTROLLER_ID: &str = "controller_id";
pub const KEY_URL: &str = "url";
pub const KEY_RETRY_DELAY: &str = "retry_delay";
pub const KEY_GATEWAY_TOKEN: &str = "gateway_token";
pub const KEY_TARGET_TOKEN: &str = "target_token";
pub const KEY_API_MODE: &str = "api_mode";
pub const KEY_ENABLED: &str = "enabled";
pub const KEY_SERVER_KIND: &str = "server_kind";
pub const KEY_TARGET_ATTRIBUTES: &str = "target_attributes";
pub const KEY_SCHEDULE_UPDATE: &str = "schedule_update";
/// Target token issued by the server; separate from the configured one.
pub const KEY_ROTATED_TARGET_TOKEN: &str = "rotated_target_token";
/// Fingerprint of the attributes last reported to the server.
pub const KEY_REPORTED_FINGERPRINT: &str = "reported_attributes_fingerprint";

/// Outcome of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub persist: bool,
    pub restart: bool,
}

impl Decision {
    pub const UNCHANGED: Decision = Decision { persist: false, restart: false };
}

/// Device identity merged into the reported target attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub client_type: String,
    pub client_version: String,
    /// Build metadata such as OS and architecture.
    pub build: BTreeMap<String, String>,
    pub update_type: String,
}

impl DeviceIdentity {
    /// Identity of this process on this host.
    pub fn detect(client_version: &str) -> Self {
        let mut build = BTreeMap::new();
        build.insert("build_os".to_owned(), std::env::consts::OS.to_owned());
        build.insert("build_arch".to_owned(), std::env::consts::ARCH.to_owned());
        build.insert("build_family".to_owned(), std::env::consts::FAMILY.to_owned());
        Self {
            client_type: "ufagent".to_owned(),
            client_version: client_version.to_owned(),
            build,
            update_type: "single_copy".to_owned(),
        }
    }

    fn decorate(&self, attributes: &mut BTreeMap<String, String>) {
        attributes.insert("client".to_owned(), self.client_type.clone());
        attributes.insert("client_version".to_owned(), self.client_version.clone());
        for (k, v) in &self.build {
            attributes.insert(k.clone(), v.clone());
        }
        attributes.insert("system_update_type".to_owned(), self.update_type.clone());
    }
}

/// Content digest of an attribute map, independent of iteration order.
///
/// Entries are sorted by key, rendered as `key_value`, joined with `-` and
/// hashed with SHA-256. Returns lowercase hex.
pub fn fingerprint<'a, I>(attributes: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut entries: Vec<(&String, &String)> = attributes.into_iter().collect();
    entries.sort();
    let joined = entries.iter().map(|(k, v)| format!("{k}_{v}")).collect::<Vec<_>>().join("-");
    let digest = ring::digest::digest(&ring::digest::SHA256, joined.as_bytes());
    digest.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    identity: DeviceIdentity,
    /// Serializes read-compare-write cycles.
    write: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, identity: DeviceIdentity) -> Self {
        Self { store, identity, write: Mutex::new(()) }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Read the persisted record; absent fields take empty, `false` or
    /// default values.
    pub fn load_persisted(&self) -> Configuration {
        let text = |key: &str| self.store.get(key).unwrap_or_default();
        let flag = |key: &str| self.store.get(key).is_some_and(|v| v == "true");

        let target_attributes = match self.store.get(KEY_TARGET_ATTRIBUTES) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(err = %e, "persisted target attributes unreadable, ignoring");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        let defaults = Configuration::default();

        Configuration {
            tenant: text(KEY_TENANT),
            controller_id: text(KEY_CONTROLLER_ID),
            retry_delay: self
                .store
                .get(KEY_RETRY_DELAY)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_delay),
            url: text(KEY_URL),
            target_token: text(KEY_TARGET_TOKEN),
            gateway_token: text(KEY_GATEWAY_TOKEN),
            api_mode: flag(KEY_API_MODE),
            enabled: flag(KEY_ENABLED),
            server_kind: match self.store.get(KEY_SERVER_KIND).as_deref() {
                Some("hawkbit") => ServerKind::Hawkbit,
                _ => ServerKind::UpdateFactory,
            },
            target_attributes,
            schedule_update: self
                .store
                .get(KEY_SCHEDULE_UPDATE)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.schedule_update),
        }
    }

    /// Persist `candidate` if it differs from the stored record and report
    /// whether the update client must be rebuilt.
    ///
    /// Attribute-only changes are persisted without a restart. An identity
    /// change also drops the server-issued target token.
    pub fn reconcile(&self, candidate: &Configuration) -> anyhow::Result<Decision> {
        let _guard = self.write.lock();
        let prior = self.load_persisted();
        if *candidate == prior {
            debug!("configuration unchanged");
            return Ok(Decision::UNCHANGED);
        }

        let mut batch = record_batch(candidate)?;
        if candidate.identity_differs(&prior) {
            info!("device identity changed, dropping any server-issued target token");
            batch = batch.remove(KEY_ROTATED_TARGET_TOKEN);
        }
        self.store.commit(batch)?;

        let restart = !candidate.materially_eq(&prior);
        info!(restart, "configuration persisted");
        Ok(Decision { persist: true, restart })
    }

    /// Token last issued by the server, if any.
    pub fn rotated_target_token(&self) -> Option<String> {
        self.store.get(KEY_ROTATED_TARGET_TOKEN).filter(|t| !t.trim().is_empty())
    }

    /// Target token to authenticate with: the server-issued one when present,
    /// else the configured one.
    pub fn effective_target_token(&self, config: &Configuration) -> String {
        self.rotated_target_token().unwrap_or_else(|| config.target_token.clone())
    }

    /// Persisted attributes plus device identity.
    pub fn decorated_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = self.load_persisted().target_attributes;
        self.identity.decorate(&mut attributes);
        attributes
    }

    pub fn reported_fingerprint(&self) -> Option<String> {
        self.store.get(KEY_REPORTED_FINGERPRINT)
    }
}

fn record_batch(config: &Configuration) -> anyhow::Result<Batch> {
    let server_kind = match config.server_kind {
        ServerKind::UpdateFactory => "update_factory",
        ServerKind::Hawkbit => "hawkbit",
    };
    Ok(Batch::new()
        .put(KEY_TENANT, config.tenant.as_str())
        .put(KEY_CONTROLLER_ID, config.controller_id.as_str())
        .put(KEY_URL, config.url.as_str())
        .put(KEY_RETRY_DELAY, config.retry_delay.to_string())
        .put(KEY_GATEWAY_TOKEN, config.gateway_token.as_str())
        .put(KEY_TARGET_TOKEN, config.target_token.as_str())
        .put(KEY_API_MODE, config.api_mode.to_string())
        .put(KEY_ENABLED, config.enabled.to_string())
        .put(KEY_SERVER_KIND, server_kind)
        .put(KEY_TARGET_ATTRIBUTES, serde_json::to_string(&config.target_attributes)?)
        .put(KEY_SCHEDULE_UPDATE, config.schedule_update.as_str()))
}

impl ConfigDataProvider for Reconciler {
    fn config_data(&self) -> BTreeMap<String, String> {
        self.decorated_attributes()
    }

    fn is_updated(&self) -> bool {
        let current = fingerprint(&self.decorated_attributes());
        self.reported_fingerprint().is_some_and(|last| last == current)
    }

    fn on_config_data_update(&self) {
        let current = fingerprint(&self.decorated_attributes());
        if let Err(e) = self.store.commit(Batch::new().put(KEY_REPORTED_FINGERPRINT, current)) {
            warn!(err = %e, "failed to persist reported attributes fingerprint");
        }
    }
}

impl TokenRotationListener for Reconciler {
    fn on_rotated(&self, token: &str) {
        let _guard = self.write.lock();
        match self.store.commit(Batch::new().put(KEY_ROTATED_TARGET_TOKEN, token)) {
            Ok(()) => info!("server-issued target token stored"),
            Err(e) => warn!(err = %e, "failed to persist server-issued target token"),
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
