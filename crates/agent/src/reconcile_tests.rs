// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use proptest::prelude::*;

use super::*;
use crate::store::{FileStore, MemoryStore};

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        client_type: "ufagent".into(),
        client_version: "1.2.3".into(),
        build: BTreeMap::from([("build_os".to_owned(), "linux".to_owned())]),
        update_type: "single_copy".into(),
    }
}

fn reconciler() -> (Arc<MemoryStore>, Reconciler) {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone(), identity());
    (store, reconciler)
}

fn config() -> Configuration {
    Configuration {
        tenant: "acme".into(),
        controller_id: "device-1".into(),
        url: "https://updates.example.com".into(),
        gateway_token: "gw".into(),
        ..Configuration::default()
    }
}

#[test]
fn empty_store_loads_defaults() {
    let (_, reconciler) = reconciler();
    let loaded = reconciler.load_persisted();
    assert_eq!(loaded.tenant, "");
    assert!(!loaded.enabled);
    assert!(!loaded.api_mode);
    assert!(loaded.target_attributes.is_empty());
    assert_eq!(loaded.schedule_update, ufagent_api::configuration::DEFAULT_SCHEDULE);
    assert_eq!(loaded.server_kind, ServerKind::UpdateFactory);
}

#[test]
fn first_configuration_persists_and_restarts() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    let mut candidate = config();
    candidate.server_kind = ServerKind::Hawkbit;
    candidate.target_attributes.insert("board".into(), "imx8".into());

    assert_eq!(reconciler.reconcile(&candidate)?, Decision { persist: true, restart: true });
    assert_eq!(reconciler.load_persisted(), candidate);
    assert_eq!(reconciler.reconcile(&candidate)?, Decision::UNCHANGED);
    Ok(())
}

#[test]
fn attribute_change_persists_without_restart() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;

    let mut candidate = config();
    candidate.target_attributes.insert("board".into(), "imx8".into());
    assert_eq!(reconciler.reconcile(&candidate)?, Decision { persist: true, restart: false });
    assert_eq!(reconciler.load_persisted().target_attributes.get("board").map(String::as_str), Some("imx8"));
    Ok(())
}

#[test]
fn url_change_restarts() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    let candidate = Configuration { url: "https://other.example.com".into(), ..config() };
    assert_eq!(reconciler.reconcile(&candidate)?, Decision { persist: true, restart: true });
    Ok(())
}

#[test]
fn legacy_flag_spelling_is_not_a_change() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    let legacy = Configuration::from_json(
        r#"{"tenant":"acme","controllerId":"device-1","url":"https://updates.example.com",
            "gatewayToken":"gw","isEnable":false,"enable":true,"apiMode":true}"#,
    )?;
    assert_eq!(reconciler.reconcile(&legacy)?, Decision::UNCHANGED);
    Ok(())
}

#[test]
fn disabling_restarts() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    let candidate = Configuration { enabled: false, ..config() };
    assert!(reconciler.reconcile(&candidate)?.restart);
    Ok(())
}

#[test]
fn identity_change_purges_rotated_token() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    reconciler.on_rotated("server-issued");
    assert_eq!(reconciler.rotated_target_token().as_deref(), Some("server-issued"));

    let candidate = Configuration { controller_id: "device-2".into(), ..config() };
    assert!(candidate.target_token.is_empty());
    reconciler.reconcile(&candidate)?;
    assert_eq!(reconciler.rotated_target_token(), None);
    Ok(())
}

/// Store where a token rotation lands just before the next commit.
struct LateRotationStore {
    inner: MemoryStore,
    armed: AtomicBool,
}

impl Store for LateRotationStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn commit(&self, batch: Batch) -> anyhow::Result<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.inner.commit(Batch::new().put(KEY_ROTATED_TARGET_TOKEN, "late"))?;
        }
        self.inner.commit(batch)
    }
}

#[test]
fn identity_change_purges_token_rotated_mid_reconcile() -> anyhow::Result<()> {
    let store = Arc::new(LateRotationStore { inner: MemoryStore::new(), armed: AtomicBool::new(false) });
    let reconciler = Reconciler::new(store.clone(), identity());
    reconciler.reconcile(&config())?;
    assert_eq!(reconciler.rotated_target_token(), None);

    store.armed.store(true, Ordering::SeqCst);
    reconciler.reconcile(&Configuration { url: "https://other.example.com".into(), ..config() })?;
    assert_eq!(reconciler.rotated_target_token(), None);
    Ok(())
}

#[test]
fn non_identity_change_keeps_rotated_token() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    reconciler.on_rotated("server-issued");

    reconciler.reconcile(&Configuration { target_token: "long-lived".into(), ..config() })?;
    assert_eq!(reconciler.rotated_target_token().as_deref(), Some("server-issued"));
    Ok(())
}

#[test]
fn effective_token_prefers_server_issued() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    let candidate = Configuration { target_token: "long-lived".into(), ..config() };
    reconciler.reconcile(&candidate)?;
    assert_eq!(reconciler.effective_target_token(&candidate), "long-lived");

    reconciler.on_rotated("server-issued");
    assert_eq!(reconciler.effective_target_token(&candidate), "server-issued");
    Ok(())
}

#[test]
fn fingerprint_known_value() {
    let attrs = BTreeMap::from([("b".to_owned(), "2".to_owned()), ("a".to_owned(), "1".to_owned())]);
    assert_eq!(
        fingerprint(&attrs),
        "b719ade58225a00b87ad767e0017ea592bf31c6cc7bcf1f627b58ef3c48ba6a3"
    );
}

proptest! {
    #[test]
    fn fingerprint_ignores_insertion_order(
        entries in prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..8)
    ) {
        let forward: HashMap<String, String> = entries.iter().cloned().collect();
        let reverse: HashMap<String, String> = entries.iter().rev().cloned().collect();
        // Duplicate keys resolve differently per direction; compare each map to its sorted copy.
        let sorted: BTreeMap<String, String> = forward.clone().into_iter().collect();
        prop_assert_eq!(fingerprint(&forward), fingerprint(&sorted));
        let sorted: BTreeMap<String, String> = reverse.clone().into_iter().collect();
        prop_assert_eq!(fingerprint(&reverse), fingerprint(&sorted));
    }
}

#[test]
fn decorated_attributes_carry_identity() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    let mut candidate = config();
    candidate.target_attributes.insert("board".into(), "imx8".into());
    candidate.target_attributes.insert("client".into(), "spoofed".into());
    reconciler.reconcile(&candidate)?;

    let attrs = reconciler.config_data();
    assert_eq!(attrs.get("board").map(String::as_str), Some("imx8"));
    assert_eq!(attrs.get("client").map(String::as_str), Some("ufagent"));
    assert_eq!(attrs.get("client_version").map(String::as_str), Some("1.2.3"));
    assert_eq!(attrs.get("build_os").map(String::as_str), Some("linux"));
    assert_eq!(attrs.get("system_update_type").map(String::as_str), Some("single_copy"));

    // Decoration never leaks into the persisted record.
    assert_eq!(reconciler.load_persisted(), candidate);
    Ok(())
}

#[test]
fn reported_fingerprint_tracks_attribute_changes() -> anyhow::Result<()> {
    let (_, reconciler) = reconciler();
    reconciler.reconcile(&config())?;
    assert!(!reconciler.is_updated());

    reconciler.on_config_data_update();
    assert!(reconciler.is_updated());

    let mut candidate = config();
    candidate.target_attributes.insert("board".into(), "imx8".into());
    reconciler.reconcile(&candidate)?;
    assert!(!reconciler.is_updated());
    Ok(())
}

#[test]
fn state_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");
    let mut candidate = config();
    candidate.target_attributes.insert("board".into(), "imx8".into());
    {
        let reconciler = Reconciler::new(Arc::new(FileStore::open(&path)?), identity());
        reconciler.reconcile(&candidate)?;
        reconciler.on_rotated("server-issued");
        reconciler.on_config_data_update();
    }

    let reconciler = Reconciler::new(Arc::new(FileStore::open(&path)?), identity());
    assert_eq!(reconciler.load_persisted(), candidate);
    assert_eq!(reconciler.rotated_target_token().as_deref(), Some("server-issued"));
    assert!(reconciler.is_updated());
    Ok(())
}

#[test]
fn unreadable_attributes_load_empty() -> anyhow::Result<()> {
    let (store, reconciler) = reconciler();
    store.commit(Batch::new().put(KEY_TARGET_ATTRIBUTES, "not json"))?;
    assert!(reconciler.load_persisted().target_attributes.is_empty());
    Ok(())
}
