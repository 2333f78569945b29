//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::server::ServerConfig;

/// Root configuration for a harness session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the upload page
    pub base_url: String,

    /// Upper bound for every selector wait, in milliseconds
    pub wait_timeout_ms: u64,

    /// Server under test
    pub server: ServerConfig,

    /// Browser engine
    pub browser: PlaywrightConfig,

    /// Fixture and output locations
    pub paths: PathsConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            wait_timeout_ms: 30_000,
            server: ServerConfig::default(),
            browser: PlaywrightConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(toml: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        info!("Loading harness configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.server.max_retries == 0 {
            return Err(E2eError::Config("server.max_retries must be at least 1".to_string()));
        }
        if self.wait_timeout_ms == 0 {
            return Err(E2eError::Config("wait_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Where fixtures are read from and where reports and logs go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base for every relative path below
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub expected_results: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            data_dir: PathBuf::from("data"),
            expected_results: PathBuf::from("data/expected_results.json"),
            reports_dir: PathBuf::from("reports"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl PathsConfig {
    /// Resolve a path against `root`; absolute paths pass through unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Absolute path of a file inside the data directory
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.resolve(&self.data_dir).join(name)
    }

    pub fn expected_results_path(&self) -> PathBuf {
        self.resolve(&self.expected_results)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }
}
