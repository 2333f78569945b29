//! Main test runner that orchestrates the harness and collects results

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixture::Harness;
use crate::report;
use crate::scenarios::Scenario;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    /// Session-level failure that prevented scenarios from running
    pub error: Option<String>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn from_results(
        started_at: chrono::DateTime<chrono::Local>,
        results: Vec<ScenarioResult>,
        skipped: usize,
        duration_ms: u64,
    ) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at: started_at.to_rfc3339(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            skipped,
            duration_ms,
            error: None,
            results,
        }
    }

    /// Suite that never got to run its scenarios
    pub fn aborted(
        started_at: chrono::DateTime<chrono::Local>,
        selected: &[Scenario],
        err: &E2eError,
    ) -> Self {
        Self {
            started_at: started_at.to_rfc3339(),
            total: selected.len(),
            passed: 0,
            failed: 0,
            skipped: selected.len(),
            duration_ms: 0,
            error: Some(err.to_string()),
            results: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: HarnessConfig,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Resolve scenario names; an empty filter selects every scenario.
    pub fn select(names: &[String]) -> E2eResult<Vec<Scenario>> {
        if names.is_empty() {
            return Ok(Scenario::ALL.to_vec());
        }
        let mut selected = Vec::new();
        for name in names {
            let scenario: Scenario = name.parse()?;
            if !selected.contains(&scenario) {
                selected.push(scenario);
            }
        }
        Ok(selected)
    }

    /// Start the harness, run `scenarios` in order and tear everything down.
    ///
    /// Only session-level failures are returned as errors; scenario failures
    /// are recorded in the result.
    pub async fn run(&self, scenarios: &[Scenario]) -> E2eResult<SuiteResult> {
        let started_at = chrono::Local::now();
        let start = Instant::now();

        let harness = Harness::start(self.config.clone()).await?;

        info!("Running {} scenario(s)...", scenarios.len());
        let mut results = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let scenario_start = Instant::now();
            let outcome = harness.run_scenario(*scenario).await;
            let duration_ms = scenario_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    info!("✓ {} ({} ms)", scenario, duration_ms);
                    results.push(ScenarioResult {
                        name: scenario.name().to_string(),
                        success: true,
                        duration_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    error!("✗ {} - {}", scenario, e);
                    results.push(ScenarioResult {
                        name: scenario.name().to_string(),
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if let Err(e) = harness.shutdown().await {
            warn!("Teardown reported an error: {}", e);
        }

        let skipped = Scenario::ALL.len().saturating_sub(scenarios.len());
        let duration_ms = start.elapsed().as_millis() as u64;
        let suite = SuiteResult::from_results(started_at, results, skipped, duration_ms);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );
        Ok(suite)
    }

    /// Write `test-results.json` and `report.html` into the reports directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<(PathBuf, PathBuf)> {
        let reports_dir = self.config.paths.reports_path();
        std::fs::create_dir_all(&reports_dir)?;

        let json_path = reports_dir.join("test-results.json");
        std::fs::write(&json_path, serde_json::to_string_pretty(results)?)?;

        let html_path = reports_dir.join("report.html");
        std::fs::write(&html_path, report::render_html(results))?;

        info!("Results written to: {}", reports_dir.display());
        Ok((json_path, html_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;

    fn result(name: &str, error: Option<&str>) -> ScenarioResult {
        ScenarioResult {
            name: name.to_string(),
            success: error.is_none(),
            duration_ms: 12,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_select_all_by_default() {
        assert_eq!(TestRunner::select(&[]).unwrap(), Scenario::ALL.to_vec());
    }

    #[test]
    fn test_select_keeps_order_and_dedups() {
        let names = vec![
            "malformed_csv_upload".to_string(),
            "page_loads".to_string(),
            "test_malformed_csv_upload".to_string(),
        ];
        assert_eq!(
            TestRunner::select(&names).unwrap(),
            vec![Scenario::MalformedCsvUpload, Scenario::PageLoads]
        );
    }

    #[test]
    fn test_select_rejects_unknown() {
        let err = TestRunner::select(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, E2eError::Config(_)));
    }

    #[test]
    fn test_suite_tally() {
        let suite = SuiteResult::from_results(
            chrono::Local::now(),
            vec![
                result("page_loads", None),
                result("valid_product_upload", Some("Expected 5 products, got 4")),
            ],
            3,
            40,
        );
        assert_eq!(suite.total, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.skipped, 3);
        assert!(!suite.success());
    }

    #[test]
    fn test_aborted_suite_is_not_success() {
        let err = E2eError::ServerHealthCheck { attempts: 5, output: String::new() };
        let suite = SuiteResult::aborted(chrono::Local::now(), &Scenario::ALL, &err);
        assert!(!suite.success());
        assert_eq!(
            suite.error.as_deref(),
            Some("Server failed to start after 5 health check attempts")
        );
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            paths: PathsConfig {
                root: dir.path().to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        };
        let runner = TestRunner::new(config);
        let results = vec![result("page_loads", None)];
        let suite = SuiteResult::from_results(chrono::Local::now(), results, 4, 5);

        let (json_path, html_path) = runner.write_results(&suite).unwrap();
        assert_eq!(json_path, dir.path().join("reports/test-results.json"));

        let json = std::fs::read_to_string(json_path).unwrap();
        let parsed: SuiteResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.passed, 1);
        assert!(std::fs::read_to_string(html_path).unwrap().contains("page_loads"));
    }
}
