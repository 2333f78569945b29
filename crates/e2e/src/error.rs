//! Error types for E2E testing

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server failed to start after {attempts} health check attempts")]
    ServerHealthCheck { attempts: usize, output: String },

    #[error("Expected results fixture unavailable at {}: {reason}", .path.display())]
    FixtureUnavailable { path: PathBuf, reason: String },

    #[error("No expectation '{field}' recorded for scenario '{scenario}'")]
    MissingExpectation { scenario: String, field: String },

    #[error("Playwright not found. Install with: npm install --prefix crates/e2e/driver && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Playwright driver exited unexpectedly")]
    DriverClosed,

    #[error("Page did not load at {url}: {reason}")]
    PageNotLoaded { url: String, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Malformed result payload: {reason} (payload: {payload:?})")]
    MalformedResultPayload { reason: String, payload: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error aborts the whole session rather than a single scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            E2eError::ServerStartup(_)
                | E2eError::ServerHealthCheck { .. }
                | E2eError::FixtureUnavailable { .. }
                | E2eError::PlaywrightNotFound
                | E2eError::Config(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
