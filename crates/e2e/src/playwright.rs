//! Playwright browser automation
//!
//! The browser is owned by a long-lived Node process running `driver/driver.js`.
//! Requests and responses are single JSON objects per line on the driver's
//! stdin/stdout; calls are strictly sequential.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::BrowserPage;

/// Exit code the driver uses when the `playwright` module cannot be resolved
const DRIVER_MISSING_PLAYWRIGHT: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unsupported browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Node executable
    pub node: String,

    /// Bridge script; its directory must contain `node_modules/playwright`
    pub driver_script: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node: "node".to_string(),
            driver_script: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/driver/driver.js"
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<DriverFault>,
}

#[derive(Debug, Deserialize)]
struct DriverFault {
    #[serde(default)]
    kind: FaultKind,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FaultKind {
    Timeout,
    #[default]
    #[serde(other)]
    Error,
}

impl DriverResponse {
    fn into_result(self, method: &str) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        let fault = self.error.unwrap_or(DriverFault {
            kind: FaultKind::Error,
            message: "driver reported failure without details".to_string(),
        });
        match fault.kind {
            FaultKind::Timeout => Err(E2eError::Timeout(fault.message)),
            FaultKind::Error => {
                Err(E2eError::Playwright(format!("{}: {}", method, fault.message)))
            }
        }
    }
}

type DriverWriter = Box<dyn AsyncWrite + Send + Unpin>;
type DriverReader = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

struct DriverIo {
    stdin: DriverWriter,
    stdout: DriverReader,
}

/// Connection to the driver process
struct Driver {
    io: Mutex<Option<DriverIo>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
}

impl Driver {
    fn from_io<W, R>(writer: W, reader: R, child: Option<Child>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            io: Mutex::new(Some(DriverIo {
                stdin: Box::new(writer),
                stdout: reader.lines(),
            })),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
        }
    }

    async fn spawn(config: &PlaywrightConfig) -> E2eResult<Self> {
        check_node_installed(&config.node)?;
        if !config.driver_script.is_file() {
            return Err(E2eError::PlaywrightNotFound);
        }

        let mut cmd = TokioCommand::new(&config.node);
        cmd.arg(&config.driver_script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = config.driver_script.parent() {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Playwright(format!("Failed to spawn {}: {}", config.node, e))
        })?;

        let stdin = child.stdin.take().ok_or(E2eError::DriverClosed)?;
        let stdout = child.stdout.take().ok_or(E2eError::DriverClosed)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        debug!("Playwright driver started: {}", config.driver_script.display());
        Ok(Self::from_io(stdin, BufReader::new(stdout), Some(child)))
    }

    async fn call(&self, method: &str, params: Value) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&DriverRequest { id, method, params })?;
        line.push('\n');

        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or(E2eError::DriverClosed)?;

        debug!("-> {}", line.trim_end());
        io.stdin.write_all(line.as_bytes()).await.map_err(pipe_error)?;
        io.stdin.flush().await.map_err(pipe_error)?;

        loop {
            let Some(reply) = io.stdout.next_line().await? else {
                return Err(E2eError::DriverClosed);
            };
            let response: DriverResponse = match serde_json::from_str(&reply) {
                Ok(response) => response,
                Err(_) => {
                    warn!("Ignoring non-protocol driver output: {}", reply);
                    continue;
                }
            };
            if response.id != id {
                warn!("Discarding stale driver response {} (waiting for {})", response.id, id);
                continue;
            }
            return response.into_result(method);
        }
    }

    /// Close the pipes and wait for the process; kill it after `grace`.
    async fn shutdown(&self, grace: Duration) -> E2eResult<Option<i32>> {
        self.io.lock().await.take();

        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(None);
        };
        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!("Playwright driver did not exit within {:?}, killing it", grace);
                child.kill().await?;
                child.wait().await?
            }
        };
        guard.take();
        Ok(status.code())
    }
}

/// A write to a driver that has already exited fails with a broken pipe
fn pipe_error(err: std::io::Error) -> E2eError {
    if err.kind() == ErrorKind::BrokenPipe {
        E2eError::DriverClosed
    } else {
        E2eError::Io(err)
    }
}

/// Check that the Node executable runs
fn check_node_installed(node: &str) -> E2eResult<()> {
    let status = std::process::Command::new(node)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

/// Session-scoped browser engine
pub struct PlaywrightBrowser {
    driver: Arc<Driver>,
    browser: Browser,
}

impl PlaywrightBrowser {
    /// Start the driver process and launch the configured browser
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        info!(
            "Starting browser ({}, headless: {})",
            config.browser.as_str(),
            config.headless
        );
        let driver = Driver::spawn(config).await?;
        Self::launch_with(driver, config).await
    }

    async fn launch_with(driver: Driver, config: &PlaywrightConfig) -> E2eResult<Self> {
        let params = json!({ "browser": config.browser.as_str(), "headless": config.headless });
        match driver.call("launch", params).await {
            Ok(result) => {
                let version = result
                    .get("version")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                info!("Browser started ({} {})", config.browser.as_str(), version);
                Ok(Self {
                    driver: Arc::new(driver),
                    browser: config.browser,
                })
            }
            Err(E2eError::DriverClosed) => {
                let code = driver.shutdown(Duration::from_secs(5)).await?;
                if code == Some(DRIVER_MISSING_PLAYWRIGHT) {
                    Err(E2eError::PlaywrightNotFound)
                } else {
                    Err(E2eError::DriverClosed)
                }
            }
            Err(e) => {
                let _ = driver.shutdown(Duration::from_secs(5)).await;
                Err(e)
            }
        }
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    /// Open a page in a fresh, isolated browser context
    pub async fn new_page(&self) -> E2eResult<PlaywrightPage> {
        let result = self.driver.call("newPage", json!({})).await?;
        let id = result.get("page").and_then(Value::as_u64).ok_or_else(|| {
            E2eError::Playwright(format!("newPage returned no page id: {}", result))
        })?;
        debug!("Opened page {}", id);
        Ok(PlaywrightPage {
            driver: Arc::clone(&self.driver),
            id,
        })
    }

    /// Close the browser and stop the driver process
    pub async fn close(self) -> E2eResult<()> {
        info!("Closing browser");
        let closed = self.driver.call("close", json!({})).await;
        self.driver.shutdown(Duration::from_secs(5)).await?;
        closed?;
        info!("Browser closed");
        Ok(())
    }
}

/// One page, owned by a single scenario
pub struct PlaywrightPage {
    driver: Arc<Driver>,
    id: u64,
}

impl PlaywrightPage {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn close(self) -> E2eResult<()> {
        debug!("Closing page {}", self.id);
        self.driver.call("closePage", json!({ "page": self.id })).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.driver.call("goto", json!({ "page": self.id, "url": url })).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        let params = json!({
            "page": self.id,
            "selector": selector,
            "timeout": timeout.as_millis() as u64,
        });
        self.driver.call("waitForSelector", params).await?;
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> E2eResult<()> {
        let params = json!({
            "page": self.id,
            "selector": selector,
            "files": [path.to_string_lossy()],
        });
        self.driver.call("setInputFiles", params).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.driver.call("click", json!({ "page": self.id, "selector": selector })).await?;
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> E2eResult<String> {
        let result = self
            .driver
            .call("innerText", json!({ "page": self.id, "selector": selector }))
            .await?;
        result
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                E2eError::Playwright(format!("innerText returned no text: {}", result))
            })
    }
}
