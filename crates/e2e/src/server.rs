//! Server management - spawning and health checking the upload server

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};

/// Configuration for spawning a server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Program and arguments; empty means attach to an already running server
    pub command: Vec<String>,

    /// Working directory for the server process
    pub working_dir: Option<PathBuf>,

    /// Fixed pause between spawning and the first health probe
    pub warmup_ms: u64,

    /// Number of health probes before giving up
    pub max_retries: usize,

    /// Pause between failed probes
    pub retry_delay_ms: u64,

    /// Per-request timeout of a single probe
    pub probe_timeout_ms: u64,

    /// How long to wait after SIGTERM before killing
    pub shutdown_grace_ms: u64,

    /// Recent output lines kept for diagnostics
    pub output_lines: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: ["uvicorn", "server.app:app", "--host", "localhost", "--port", "8000"]
                .into_iter()
                .map(String::from)
                .collect(),
            working_dir: None,
            warmup_ms: 5_000,
            max_retries: 5,
            retry_delay_ms: 2_000,
            probe_timeout_ms: 2_000,
            shutdown_grace_ms: 5_000,
            output_lines: 200,
        }
    }
}

impl ServerConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Bounded buffer of the most recent stdout/stderr lines
#[derive(Clone, Default)]
pub struct OutputCapture {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputCapture {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// Captured lines joined with newlines
    pub fn snapshot(&self) -> String {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    /// Forward every line of `stream` into the buffer until it closes
    fn drain<R>(&self, stream: R, label: &'static str)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let capture = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "server", "[{}] {}", label, line);
                capture.push(format!("[{}] {}", label, line));
            }
        });
    }
}

/// Probe `url` up to `attempts` times, pausing `delay` between failures.
///
/// Only an HTTP 200 counts as healthy. Returns the attempt that succeeded.
pub async fn verify_healthy(
    client: &reqwest::Client,
    url: &str,
    attempts: usize,
    delay: Duration,
) -> E2eResult<usize> {
    for attempt in 1..=attempts {
        info!("Server verification attempt {}/{}", attempt, attempts);

        match client.get(url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                info!("Server started and verified");
                return Ok(attempt);
            }
            Ok(resp) => {
                warn!("Server response: {}, retrying in {:?}...", resp.status(), delay);
            }
            Err(e) => {
                warn!(
                    "Server verification attempt {} failed: {}, retrying in {:?}...",
                    attempt, e, delay
                );
            }
        }

        if attempt < attempts {
            sleep(delay).await;
        }
    }

    Err(E2eError::ServerHealthCheck {
        attempts,
        output: String::new(),
    })
}

/// Handle to the server under test
pub struct ServerHandle {
    child: Option<Child>,
    output: OutputCapture,
    base_url: String,
    shutdown_grace: Duration,
}

impl ServerHandle {
    /// Spawn the server (unless attaching) and wait until it answers on `base_url`.
    pub async fn spawn(config: &ServerConfig, base_url: &str) -> E2eResult<Self> {
        let output = OutputCapture::new(config.output_lines);

        let child = match config.command.split_first() {
            Some((program, args)) => {
                info!("Starting server: {}", config.command.join(" "));

                let mut cmd = Command::new(program);
                cmd.args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                if let Some(dir) = &config.working_dir {
                    cmd.current_dir(dir);
                }

                let mut child = cmd.spawn().map_err(|e| {
                    E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e))
                })?;
                if let Some(stdout) = child.stdout.take() {
                    output.drain(stdout, "stdout");
                }
                if let Some(stderr) = child.stderr.take() {
                    output.drain(stderr, "stderr");
                }
                Some(child)
            }
            None => {
                info!("Attaching to running server at {}", base_url);
                None
            }
        };

        let mut handle = ServerHandle {
            child,
            output,
            base_url: base_url.to_string(),
            shutdown_grace: config.shutdown_grace(),
        };

        if handle.is_managed() {
            sleep(config.warmup()).await;
        }

        if let Err(e) = handle.wait_for_healthy(config).await {
            handle.report_failure();
            if let Err(stop_err) = handle.stop().await {
                warn!("Failed to stop server after failed startup: {}", stop_err);
            }
            return Err(e);
        }

        Ok(handle)
    }

    async fn wait_for_healthy(&mut self, config: &ServerConfig) -> E2eResult<()> {
        if let Some(child) = self.child.as_mut() {
            if let Some(status) = child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "server exited during warm-up ({})",
                    status
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()?;

        let attempts = config.max_retries;
        match verify_healthy(&client, &self.base_url, attempts, config.retry_delay()).await {
            Ok(_) => Ok(()),
            Err(E2eError::ServerHealthCheck { attempts, .. }) => {
                error!("Server verification failed after maximum retries");
                Err(E2eError::ServerHealthCheck {
                    attempts,
                    output: self.output.snapshot(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn report_failure(&self) {
        let output = self.output.snapshot();
        if output.is_empty() {
            error!("Server produced no output");
        } else {
            error!("Server output:\n{}", output);
        }
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether this handle owns the server process
    pub fn is_managed(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the server: SIGTERM, wait out the grace period, then kill.
    pub async fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            info!("Server already exited ({})", status);
            return Ok(());
        }

        info!("Stopping server (pid: {:?})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    let exited = tokio::time::timeout(self.shutdown_grace, child.wait()).await;
                    if let Ok(status) = exited {
                        info!("Server stopped ({})", status?);
                        return Ok(());
                    }
                    warn!("Server ignored SIGTERM for {:?}, killing it", self.shutdown_grace);
                }
            }
        }

        child.kill().await?;
        info!("Server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
