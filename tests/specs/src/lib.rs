// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `ufagent` binary as a subprocess and exercises it over
//! HTTP, WebSocket, and Unix socket transports.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

use ufagent_api::Configuration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `ufagent` binary.
pub fn agent_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("ufagent")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Make a raw HTTP/1.1 GET request over a Unix socket, returning the response body.
pub async fn unix_http_get(socket_path: &Path, path: &str) -> anyhow::Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8(buf)?;

    let body = response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("").to_string();
    Ok(body)
}

/// A running `ufagent` process that is killed on drop.
pub struct AgentProcess {
    child: Child,
    port: Option<u16>,
    socket_path: Option<PathBuf>,
    state_dir: Option<tempfile::TempDir>,
}

/// Builder for configuring which transports an [`AgentProcess`] enables.
///
/// By default, only the TCP port is enabled and no configuration file is
/// passed.
pub struct AgentBuilder {
    tcp: bool,
    socket: bool,
    configuration: Option<Configuration>,
    state_dir: Option<tempfile::TempDir>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self { tcp: true, socket: false, configuration: None, state_dir: None }
    }
}

impl AgentBuilder {
    /// Disable the TCP port (`--port`).
    pub fn no_tcp(mut self) -> Self {
        self.tcp = false;
        self
    }

    /// Enable the Unix socket transport (`--socket`).
    pub fn socket(mut self) -> Self {
        self.socket = true;
        self
    }

    /// Write `configuration` to a file and pass it with `--config-file`.
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Reuse a state directory, e.g. one left behind by a previous process.
    pub fn state_dir(mut self, dir: tempfile::TempDir) -> Self {
        self.state_dir = Some(dir);
        self
    }

    /// Spawn the agent with the configured transports.
    pub fn spawn(self) -> anyhow::Result<AgentProcess> {
        ensure_crypto();
        let binary = agent_binary();
        anyhow::ensure!(binary.exists(), "ufagent binary not found at {}", binary.display());

        let state_dir = match self.state_dir {
            Some(dir) => dir,
            None => tempfile::tempdir()?,
        };
        let port = if self.tcp { Some(free_port()?) } else { None };
        let socket_path = self.socket.then(|| state_dir.path().join("ufagent.sock"));

        let mut args: Vec<String> = vec![
            "--state-dir".into(),
            state_dir.path().to_string_lossy().into_owned(),
        ];
        if let Some(p) = port {
            args.extend(["--port".into(), p.to_string()]);
        }
        if let Some(ref p) = socket_path {
            args.extend(["--socket".into(), p.to_string_lossy().into_owned()]);
        }
        if let Some(ref configuration) = self.configuration {
            let path = state_dir.path().join("configuration.json");
            std::fs::write(&path, configuration.to_json())?;
            args.extend(["--config-file".into(), path.to_string_lossy().into_owned()]);
        }
        args.extend([
            "--host".into(),
            "127.0.0.1".into(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ]);

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(AgentProcess { child, port, socket_path, state_dir: Some(state_dir) })
    }
}

impl AgentProcess {
    /// Create a builder for custom transport configuration.
    pub fn build() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Spawn the agent with the default TCP-only configuration.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_ref().map(|d| d.path())
    }

    /// Base URL for HTTP requests (requires TCP).
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port.unwrap_or(0))
    }

    /// WebSocket URL (requires TCP).
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port.unwrap_or(0))
    }

    /// Poll health until responsive, using TCP or Unix socket (whichever is available).
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        if let Some(port) = self.port {
            let client = reqwest::Client::new();
            let url = format!("http://127.0.0.1:{port}/api/v1/health");
            loop {
                if tokio::time::Instant::now() > deadline {
                    anyhow::bail!("ufagent did not become healthy within {timeout:?}");
                }
                if let Ok(resp) = client.get(&url).send().await {
                    if resp.status().is_success() {
                        return Ok(());
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        } else if let Some(ref socket_path) = self.socket_path {
            loop {
                if tokio::time::Instant::now() > deadline {
                    anyhow::bail!("ufagent did not become healthy within {timeout:?}");
                }
                if let Ok(body) = unix_http_get(socket_path, "/api/v1/health").await {
                    if body.contains("running") {
                        return Ok(());
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        } else {
            anyhow::bail!("no transport available for health check");
        }
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> anyhow::Result<()> {
        let status = Command::new("kill")
            .args(["-TERM", &self.child.id().to_string()])
            .status()?;
        anyhow::ensure!(status.success(), "kill -TERM failed: {status}");
        Ok(())
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("ufagent did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Stop the process and hand back its state directory.
    pub fn into_state_dir(mut self) -> anyhow::Result<tempfile::TempDir> {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.state_dir.take().ok_or_else(|| anyhow::anyhow!("state dir already taken"))
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
