// ABOUTME: Hand-off to the control plane once the platform services are running.
// ABOUTME: The command bootstrapper waits for HTTP readiness, then runs an external program.

use crate::install::BootstrapPlan;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;

const READY_POLL_INTERVAL: Duration = Duration::from_secs(3);
const READY_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid control plane url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("control plane at {url} did not answer within {waited:?}")]
    NotReady { url: String, waited: Duration },

    #[error("failed to run bootstrap command {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bootstrap command {action} exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        action: BootstrapAction,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to encode bootstrap input: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapAction {
    Bootstrap,
    Register,
}

impl BootstrapAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapAction::Bootstrap => "bootstrap",
            BootstrapAction::Register => "register",
        }
    }
}

impl std::fmt::Display for BootstrapAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configures the control plane once it is reachable.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Apply `plan` against the control plane at `url`.
    async fn bootstrap(&self, url: &str, plan: &BootstrapPlan) -> Result<()>;

    /// Register machines provisioned after bootstrap as application nodes.
    async fn register_nodes(&self, url: &str, nodes: &[IpAddr]) -> Result<()>;
}

/// Runs an external program for each bootstrap action.
#[derive(Debug, Clone)]
pub struct CommandBootstrapper {
    program: PathBuf,
    args: Vec<String>,
    target: String,
    ready_timeout: Duration,
}

impl CommandBootstrapper {
    pub fn new(program: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            target: target.into(),
            ready_timeout: Duration::from_secs(300),
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn env(&self, action: BootstrapAction, url: &str) -> HashMap<&'static str, String> {
        HashMap::from([
            ("FLOTILLA_ACTION", action.as_str().to_string()),
            ("FLOTILLA_TARGET", self.target.clone()),
            ("FLOTILLA_CONTROL_PLANE_URL", url.to_string()),
        ])
    }

    async fn run(&self, action: BootstrapAction, url: &str, input: Vec<u8>) -> Result<()> {
        tracing::info!("running bootstrap command {} ({})", self.program.display(), action);

        let spawn_err = |source| BootstrapError::Spawn {
            program: self.program.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env(action, url))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await.map_err(spawn_err)?;
            stdin.shutdown().await.map_err(spawn_err)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("{} output: {}", action, stdout.trim());
        }

        if !output.status.success() {
            return Err(BootstrapError::CommandFailed {
                action,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Bootstrapper for CommandBootstrapper {
    async fn bootstrap(&self, url: &str, plan: &BootstrapPlan) -> Result<()> {
        wait_until_ready(url, self.ready_timeout).await?;
        self.run(BootstrapAction::Bootstrap, url, serde_json::to_vec(plan)?)
            .await
    }

    async fn register_nodes(&self, url: &str, nodes: &[IpAddr]) -> Result<()> {
        let input = serde_json::to_vec(&serde_json::json!({ "nodes_to_register": nodes }))?;
        self.run(BootstrapAction::Register, url, input).await
    }
}

/// Poll `url` until it answers any HTTP response.
pub async fn wait_until_ready(url: &str, timeout: Duration) -> Result<()> {
    let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        BootstrapError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })?;
    let (host, port) = connect_target(&uri).ok_or_else(|| BootstrapError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".to_string(),
    })?;

    let start = Instant::now();
    loop {
        match tokio::time::timeout(READY_REQUEST_TIMEOUT, request_status(host, port, &uri)).await
        {
            Ok(Ok(status)) => {
                tracing::debug!("control plane answered {}", status);
                return Ok(());
            }
            Ok(Err(reason)) => tracing::debug!("control plane not ready: {}", reason),
            Err(_) => tracing::debug!("control plane readiness request timed out"),
        }
        if start.elapsed() >= timeout {
            return Err(BootstrapError::NotReady {
                url: url.to_string(),
                waited: timeout,
            });
        }
        tokio::time::sleep(READY_POLL_INTERVAL.min(timeout)).await;
    }
}

/// Host and port to dial for `uri`. IPv6 literals lose their brackets.
fn connect_target(uri: &Uri) -> Option<(&str, u16)> {
    let host = uri.host()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Some((host, uri.port_u16().unwrap_or(80)))
}

async fn request_status(host: &str, port: u16, uri: &Uri) -> std::result::Result<u16, String> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| e.to_string())?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| format!("HTTP handshake failed: {e}"))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("readiness connection error: {}", e);
        }
    });

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| format!("{host}:{port}"));
    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", authority)
        .body(Empty::<Bytes>::new())
        .map_err(|e| format!("failed to build request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    Ok(resp.status().as_u16())
}
