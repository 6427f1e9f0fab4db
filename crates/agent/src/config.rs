// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use ufagent_api::Configuration;

/// File name of the persisted store inside the state directory.
pub const STATE_FILE: &str = "state.json";

/// Background update agent: keeps subscribers informed of update progress.
#[derive(Debug, Clone, Parser)]
#[command(name = "ufagent", version, about)]
pub struct AgentConfig {
    /// Host address to bind to.
    #[arg(long, env = "UFAGENT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "UFAGENT_PORT")]
    pub port: Option<u16>,

    /// Unix socket path for HTTP/WebSocket.
    #[arg(long, env = "UFAGENT_SOCKET")]
    pub socket: Option<String>,

    /// Directory holding persisted configuration and tokens.
    #[arg(long, env = "UFAGENT_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Service configuration JSON file; overrides the persisted one at startup.
    #[arg(long, env = "UFAGENT_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "UFAGENT_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "UFAGENT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Client version reported to the update server.
    #[arg(long, env = "UFAGENT_CLIENT_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub client_version: String,

    /// Outbound frames buffered per subscriber before it is dropped as stalled.
    #[arg(long, env = "UFAGENT_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,
}

impl AgentConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port.is_none() && self.socket.is_none() {
            anyhow::bail!("either --port or --socket must be specified");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("--queue-capacity must be at least 1");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {}", self.log_format);
        }
        Ok(())
    }

    /// Resolve the state directory: flag, then `$XDG_STATE_HOME/ufagent`,
    /// then `$HOME/.local/state/ufagent`, then `.ufagent`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(xdg).join("ufagent");
        }
        if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(home).join(".local/state/ufagent");
        }
        PathBuf::from(".ufagent")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Read the `--config-file` configuration, if one was given.
    pub fn load_config_file(&self) -> anyhow::Result<Option<Configuration>> {
        let Some(ref path) = self.config_file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let config = Configuration::from_json(&contents)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
        Ok(Some(config))
    }

    /// Build a minimal `AgentConfig` for tests (port 0, debug logging).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: Some(0),
            socket: None,
            state_dir: None,
            config_file: None,
            log_format: "text".into(),
            log_level: "debug".into(),
            client_version: "0.0.0-test".into(),
            queue_capacity: 16,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
