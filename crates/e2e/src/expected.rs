//! Expected outcomes fixture (`data/expected_results.json`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

use crate::error::{E2eError, E2eResult};

/// Recorded outcome for one upload scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioExpectation {
    /// Number of records a successful upload returns
    #[serde(default)]
    pub total: Option<usize>,

    /// Number of error messages a rejected upload returns
    #[serde(default)]
    pub error_count: Option<usize>,

    /// Messages that must each appear in the returned error list
    #[serde(default)]
    pub expected_errors: Vec<String>,
}

/// All scenario expectations, keyed by scenario name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedResults {
    scenarios: BTreeMap<String, ScenarioExpectation>,
}

impl ExpectedResults {
    /// Load expected results from a JSON file.
    ///
    /// Any read or parse failure is reported as [`E2eError::FixtureUnavailable`],
    /// which aborts the session.
    pub fn load(path: &Path) -> E2eResult<Self> {
        info!("Loading expected results from {}", path.display());

        let unavailable = |reason: String| {
            error!("Failed to load expected results: {}", reason);
            E2eError::FixtureUnavailable {
                path: path.to_path_buf(),
                reason,
            }
        };

        let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let results = Self::from_json(&content).map_err(|e| unavailable(e.to_string()))?;

        info!("Expected results loaded successfully ({} scenarios)", results.scenarios.len());
        Ok(results)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Expectation recorded for `name`
    pub fn scenario(&self, name: &str) -> E2eResult<&ScenarioExpectation> {
        self.scenarios.get(name).ok_or_else(|| E2eError::MissingExpectation {
            scenario: name.to_string(),
            field: "*".to_string(),
        })
    }
}

impl ScenarioExpectation {
    pub fn total(&self, scenario: &str) -> E2eResult<usize> {
        self.total.ok_or_else(|| missing(scenario, "total"))
    }

    pub fn error_count(&self, scenario: &str) -> E2eResult<usize> {
        self.error_count.ok_or_else(|| missing(scenario, "error_count"))
    }
}

fn missing(scenario: &str, field: &str) -> E2eError {
    E2eError::MissingExpectation {
        scenario: scenario.to_string(),
        field: field.to_string(),
    }
}
