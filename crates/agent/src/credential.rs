// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential attachment and server-driven target-token rotation.
//!
//! [`AuthClient`] wraps the HTTP client used by an update engine. Every
//! request goes out with the current credential set; requests to the
//! configuration-data endpoint ask the server for a fresh target token, and
//! a token returned in the response replaces the old one for all later
//! requests.

use std::sync::{Arc, Once};

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing::{debug, info, warn};
use ufagent_api::ServerKind;

/// Last path segment of the configuration-data endpoint.
pub const CONFIG_DATA_SEGMENT: &str = "configData";

/// Request header asking the server to return a rotated target token.
pub const EXPECT_TARGET_TOKEN: &str = "expect-uf-target-token";

/// Response header carrying a rotated target token.
pub const TARGET_TOKEN: &str = "uf-target-token";

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn install_crypto_provider() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialKind {
    Gateway,
    TargetToken,
}

impl CredentialKind {
    /// Authorization scheme sent for this kind.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Gateway => "GatewayToken",
            Self::TargetToken => "TargetToken",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub kind: CredentialKind,
    pub token: String,
}

impl Credential {
    pub fn gateway(token: impl Into<String>) -> Self {
        Self { kind: CredentialKind::Gateway, token: token.into() }
    }

    pub fn target_token(token: impl Into<String>) -> Self {
        Self { kind: CredentialKind::TargetToken, token: token.into() }
    }

    pub fn header_name(&self) -> HeaderName {
        AUTHORIZATION
    }

    pub fn header_value(&self) -> String {
        format!("{} {}", self.kind.scheme(), self.token)
    }

    pub fn is_blank(&self) -> bool {
        self.token.trim().is_empty()
    }
}

/// At most one credential per kind, kept in kind order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    entries: Vec<Credential>,
}

impl CredentialSet {
    pub fn new(gateway_token: &str, target_token: &str) -> Self {
        Self::default()
            .with(Credential::gateway(gateway_token))
            .with(Credential::target_token(target_token))
    }

    /// Insert `credential`, replacing any credential of the same kind.
    pub fn with(mut self, credential: Credential) -> Self {
        self.entries.retain(|c| c.kind != credential.kind);
        self.entries.push(credential);
        self.entries.sort_by_key(|c| c.kind);
        self
    }

    pub fn get(&self, kind: CredentialKind) -> Option<&Credential> {
        self.entries.iter().find(|c| c.kind == kind)
    }

    /// Credentials that are attached to requests.
    pub fn active(&self) -> impl Iterator<Item = &Credential> {
        self.entries.iter().filter(|c| !c.is_blank())
    }
}

/// Receives server-issued target tokens so they outlive the client.
pub trait TokenRotationListener: Send + Sync {
    fn on_rotated(&self, token: &str);
}

/// HTTP client that authenticates every request and absorbs token rotation.
pub struct AuthClient {
    http: reqwest::Client,
    credentials: RwLock<Arc<CredentialSet>>,
    server_kind: ServerKind,
    listener: Arc<dyn TokenRotationListener>,
}

impl AuthClient {
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSet,
        server_kind: ServerKind,
        listener: Arc<dyn TokenRotationListener>,
    ) -> Self {
        Self { http, credentials: RwLock::new(Arc::new(credentials)), server_kind, listener }
    }

    /// Snapshot of the current credential set.
    pub fn credentials(&self) -> Arc<CredentialSet> {
        Arc::clone(&*self.credentials.read())
    }

    /// Start a request; send it with [`AuthClient::execute`].
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Send `request` with credentials attached.
    ///
    /// Transport errors are returned as-is.
    pub async fn execute(&self, mut request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let asked = self.prepare(&mut request);
        let response = self.http.execute(request).await?;
        if asked {
            self.absorb(response.headers());
        }
        Ok(response)
    }

    /// Replace any authorization headers with the current credentials.
    ///
    /// Returns `true` if the request asks the server for a rotated token.
    pub fn prepare(&self, request: &mut reqwest::Request) -> bool {
        let set = self.credentials();
        let asks = self.server_kind == ServerKind::UpdateFactory && is_config_data(request.url());
        let headers = request.headers_mut();
        headers.remove(AUTHORIZATION);
        for credential in set.active() {
            match HeaderValue::from_str(&credential.header_value()) {
                Ok(value) => {
                    headers.append(credential.header_name(), value);
                }
                Err(_) => warn!(kind = ?credential.kind, "token is not a valid header value, skipped"),
            }
        }

        if asks {
            headers.insert(EXPECT_TARGET_TOKEN, HeaderValue::from_static("true"));
        }
        asks
    }

    /// Take a rotated target token from response headers, if present.
    pub fn absorb(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get(TARGET_TOKEN) else {
            return false;
        };
        let token = match value.to_str() {
            Ok(t) => t.trim(),
            Err(_) => {
                warn!("rotated target token is not valid text, ignored");
                return false;
            }
        };
        if token.is_empty() {
            debug!("server returned an empty target token, ignored");
            return false;
        }
        self.rotate(token);
        true
    }

    /// Swap in `token` as the target token in one step, then notify the
    /// listener.
    pub fn rotate(&self, token: &str) {
        {
            let mut current = self.credentials.write();
            if current.get(CredentialKind::TargetToken).is_some_and(|c| c.token == token) {
                return;
            }
            let next = CredentialSet::clone(&current).with(Credential::target_token(token));
            *current = Arc::new(next);
        }
        info!("target token rotated by server");
        self.listener.on_rotated(token);
    }
}

fn is_config_data(url: &reqwest::Url) -> bool {
    url.path().trim_end_matches('/').rsplit('/').next() == Some(CONFIG_DATA_SEGMENT)
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
