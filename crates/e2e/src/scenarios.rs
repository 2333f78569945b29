//! Upload scenarios checked against the live page

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::PathsConfig;
use crate::error::{E2eError, E2eResult};
use crate::expected::ExpectedResults;
use crate::page::{BrowserPage, UploadPage};
use crate::payload::{UploadResult, UploadStatus};

/// Header row shared by every product CSV
pub const PRODUCT_CSV_HEADER: &str = "id,name,price,category,stock";

/// Header only, no data rows
pub const EMPTY_PRODUCTS_CSV: &str = "id,name,price,category,stock\n";

/// One column short in the header, full data row
pub const MALFORMED_PRODUCTS_CSV: &str = "id,name,price,category\n1,Laptop,999.99,Electronics,50\n";

/// Fail the current scenario with [`E2eError::AssertionFailed`] unless `cond` holds.
macro_rules! check {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(E2eError::AssertionFailed(format!($($msg)+)));
        }
    };
}

/// Everything a scenario may touch
pub struct ScenarioContext<'a> {
    pub page: &'a dyn BrowserPage,
    pub base_url: &'a str,
    pub expected: &'a ExpectedResults,
    pub paths: &'a PathsConfig,
    pub wait_timeout: Duration,
}

impl<'a> ScenarioContext<'a> {
    fn upload_page(&self) -> UploadPage<'a, dyn BrowserPage + 'a> {
        UploadPage::new(self.page, self.base_url).with_wait_timeout(self.wait_timeout)
    }

    /// Navigate, upload `path` and return the parsed results
    async fn upload(&self, path: &Path) -> E2eResult<UploadResult> {
        let submitted = self.upload_page().navigate().await?.upload_file(path).await?;
        submitted.get_results().await
    }
}

/// CSV written for a single scenario and removed when dropped
#[derive(Debug)]
pub struct TempCsv {
    path: PathBuf,
}

impl TempCsv {
    pub fn create(path: PathBuf, contents: &str) -> E2eResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempCsv {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    PageLoads,
    ValidProductUpload,
    InvalidProductUpload,
    EmptyFileUpload,
    MalformedCsvUpload,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::PageLoads,
        Scenario::ValidProductUpload,
        Scenario::InvalidProductUpload,
        Scenario::EmptyFileUpload,
        Scenario::MalformedCsvUpload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::PageLoads => "page_loads",
            Scenario::ValidProductUpload => "valid_product_upload",
            Scenario::InvalidProductUpload => "invalid_product_upload",
            Scenario::EmptyFileUpload => "empty_file_upload",
            Scenario::MalformedCsvUpload => "malformed_csv_upload",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::PageLoads => "The upload page loads with its file input",
            Scenario::ValidProductUpload => "A valid products CSV is ingested completely",
            Scenario::InvalidProductUpload => "An invalid products CSV reports every validation error",
            Scenario::EmptyFileUpload => "A header-only CSV succeeds with no records",
            Scenario::MalformedCsvUpload => "A CSV with a column count mismatch is rejected",
        }
    }

    pub async fn run(self, ctx: &ScenarioContext<'_>) -> E2eResult<()> {
        info!("Starting test_{}", self.name());
        match self {
            Scenario::PageLoads => page_loads(ctx).await?,
            Scenario::ValidProductUpload => valid_product_upload(ctx).await?,
            Scenario::InvalidProductUpload => invalid_product_upload(ctx).await?,
            Scenario::EmptyFileUpload => empty_file_upload(ctx).await?,
            Scenario::MalformedCsvUpload => malformed_csv_upload(ctx).await?,
        }
        info!("test_{} completed successfully", self.name());
        Ok(())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches("test_");
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == name)
            .ok_or_else(|| E2eError::Config(format!("unknown scenario '{}'", s)))
    }
}

fn check_status(results: &UploadResult, expected: UploadStatus) -> E2eResult<()> {
    check!(
        results.status == expected,
        "Expected status '{}', got '{}'",
        expected,
        results.status
    );
    Ok(())
}

async fn page_loads(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let page = ctx.upload_page().navigate().await?;
    let is_loaded = page.is_page_loaded().await;
    check!(is_loaded, "Upload page failed to load");
    Ok(())
}

async fn valid_product_upload(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let total = ctx.expected.scenario("valid_products")?.total("valid_products")?;

    let results = ctx.upload(&ctx.paths.data_file("valid_products.csv")).await?;

    check_status(&results, UploadStatus::Success)?;
    let records = results.records()?;
    check!(records.len() == total, "Expected {} products, got {}", total, records.len());
    Ok(())
}

async fn invalid_product_upload(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let expected = ctx.expected.scenario("invalid_products")?;
    let error_count = expected.error_count("invalid_products")?;

    let results = ctx.upload(&ctx.paths.data_file("invalid_products.csv")).await?;

    check_status(&results, UploadStatus::Error)?;
    let errors = results.error_messages()?;
    check!(errors.len() == error_count, "Expected {} errors, got {}", error_count, errors.len());

    for expected_error in &expected.expected_errors {
        check!(
            errors.contains(expected_error),
            "Expected error '{}' not found in results",
            expected_error
        );
    }
    Ok(())
}

async fn empty_file_upload(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let csv = TempCsv::create(ctx.paths.data_file("empty_products.csv"), EMPTY_PRODUCTS_CSV)?;

    let first = ctx.upload(csv.path()).await?;
    check_status(&first, UploadStatus::Success)?;
    let records = first.records()?;
    check!(records.is_empty(), "Expected 0 products, got {}", records.len());

    // Uploading the same file again must give the same answer.
    let second = ctx.upload(csv.path()).await?;
    check!(
        second == first,
        "Repeated upload of an empty file changed the result: {:?} then {:?}",
        first,
        second
    );
    Ok(())
}

async fn malformed_csv_upload(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let path = ctx.paths.data_file("malformed_products.csv");
    let csv = TempCsv::create(path, MALFORMED_PRODUCTS_CSV)?;

    let results = ctx.upload(csv.path()).await?;

    check_status(&results, UploadStatus::Error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::FakePage;
    use test_case::test_case;

    const EXPECTED: &str = r#"{
        "valid_products": { "total": 3 },
        "invalid_products": {
            "error_count": 2,
            "expected_errors": ["Row 2: price must be a number", "Row 3: stock must be a non-negative integer"]
        }
    }"#;

    const VALID: &str = r#"{"status": "success", "data": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;
    const INVALID: &str = r#"{"status": "error", "errors": ["Row 3: stock must be a non-negative integer", "Row 2: price must be a number"]}"#;
    const EMPTY: &str = r#"{"status": "success", "data": []}"#;
    const MISMATCH: &str = r#"{"status": "error", "errors": ["Row 1: expected 4 columns, found 5"]}"#;

    fn well_behaved_page() -> FakePage {
        FakePage::new()
            .respond("valid_products.csv", VALID)
            .respond("invalid_products.csv", INVALID)
            .respond("empty_products.csv", EMPTY)
            .respond("malformed_products.csv", MISMATCH)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: PathsConfig,
        expected: ExpectedResults,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let paths = PathsConfig {
                root: dir.path().to_path_buf(),
                ..Default::default()
            };
            Self {
                _dir: dir,
                paths,
                expected: ExpectedResults::from_json(EXPECTED).unwrap(),
            }
        }

        fn context<'a>(&'a self, page: &'a FakePage) -> ScenarioContext<'a> {
            ScenarioContext {
                page,
                base_url: "http://localhost:8000",
                expected: &self.expected,
                paths: &self.paths,
                wait_timeout: Duration::from_millis(50),
            }
        }
    }

    #[tokio::test]
    async fn test_every_scenario_passes_against_conforming_page() {
        let fixture = Fixture::new();
        let page = well_behaved_page();
        for scenario in Scenario::ALL {
            scenario.run(&fixture.context(&page)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_valid_upload_count_mismatch() {
        let fixture = Fixture::new();
        let body = r#"{"status": "success", "data": [{"id": 1}]}"#;
        let page = FakePage::new().respond("valid_products.csv", body);
        let err = Scenario::ValidProductUpload.run(&fixture.context(&page)).await.unwrap_err();
        match err {
            E2eError::AssertionFailed(msg) => assert_eq!(msg, "Expected 3 products, got 1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_valid_upload_wrong_status() {
        let fixture = Fixture::new();
        let page = FakePage::new().respond("valid_products.csv", INVALID);
        let err = Scenario::ValidProductUpload.run(&fixture.context(&page)).await.unwrap_err();
        match err {
            E2eError::AssertionFailed(msg) => {
                assert_eq!(msg, "Expected status 'success', got 'error'")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_upload_requires_each_expected_message() {
        let fixture = Fixture::new();
        let page = FakePage::new().respond(
            "invalid_products.csv",
            r#"{"status": "error", "errors": ["Row 2: price must be a number", "Row 9: something else"]}"#,
        );
        let err = Scenario::InvalidProductUpload.run(&fixture.context(&page)).await.unwrap_err();
        match err {
            E2eError::AssertionFailed(msg) => assert_eq!(
                msg,
                "Expected error 'Row 3: stock must be a non-negative integer' not found in results"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_upload_without_fixture_entry() {
        let fixture = Fixture {
            expected: ExpectedResults::from_json(r#"{"valid_products": {"total": 3}}"#).unwrap(),
            ..Fixture::new()
        };
        let page = well_behaved_page();
        let err = Scenario::InvalidProductUpload.run(&fixture.context(&page)).await.unwrap_err();
        assert!(matches!(err, E2eError::MissingExpectation { .. }));
        assert!(page.calls().is_empty(), "no browser work before expectations resolve");
    }

    #[tokio::test]
    async fn test_empty_upload_removes_file_and_uploads_twice() {
        let fixture = Fixture::new();
        let page = well_behaved_page();
        Scenario::EmptyFileUpload.run(&fixture.context(&page)).await.unwrap();

        assert!(!fixture.paths.data_file("empty_products.csv").exists());
        let uploads = page.calls().iter().filter(|c| c.starts_with("click:")).count();
        assert_eq!(uploads, 2);
    }

    #[tokio::test]
    async fn test_temp_files_removed_when_scenario_fails() {
        let fixture = Fixture::new();
        let page = FakePage::new()
            .respond("empty_products.csv", MISMATCH)
            .respond("malformed_products.csv", EMPTY);

        assert!(Scenario::EmptyFileUpload.run(&fixture.context(&page)).await.is_err());
        assert!(Scenario::MalformedCsvUpload.run(&fixture.context(&page)).await.is_err());

        assert!(!fixture.paths.data_file("empty_products.csv").exists());
        assert!(!fixture.paths.data_file("malformed_products.csv").exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_when_results_never_render() {
        let fixture = Fixture::new();
        let page = FakePage::new().without_results();
        let err = Scenario::MalformedCsvUpload.run(&fixture.context(&page)).await.unwrap_err();
        assert!(matches!(err, E2eError::Timeout(_)));
        assert!(!fixture.paths.data_file("malformed_products.csv").exists());
    }

    #[tokio::test]
    async fn test_page_loads_fails_without_form() {
        let fixture = Fixture::new();
        let page = FakePage::new().without_form();
        let err = Scenario::PageLoads.run(&fixture.context(&page)).await.unwrap_err();
        assert!(matches!(err, E2eError::PageNotLoaded { .. }));
    }

    #[test]
    fn test_temp_csv_contents_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("malformed_products.csv");
        {
            let csv = TempCsv::create(path.clone(), MALFORMED_PRODUCTS_CSV).unwrap();
            let written = std::fs::read_to_string(csv.path()).unwrap();
            let mut lines = written.lines();
            assert_eq!(lines.next().unwrap().split(',').count(), 4);
            assert_eq!(lines.next().unwrap().split(',').count(), 5);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_csv_is_header_only() {
        assert_eq!(EMPTY_PRODUCTS_CSV.trim_end(), PRODUCT_CSV_HEADER);
    }

    #[test_case("page_loads", Scenario::PageLoads)]
    #[test_case("valid_product_upload", Scenario::ValidProductUpload)]
    #[test_case("test_invalid_product_upload", Scenario::InvalidProductUpload)]
    #[test_case(" empty_file_upload ", Scenario::EmptyFileUpload)]
    #[test_case("malformed_csv_upload", Scenario::MalformedCsvUpload)]
    fn test_scenario_from_name(name: &str, expected: Scenario) {
        assert_eq!(name.parse::<Scenario>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_scenario_name() {
        assert!("upload_everything".parse::<Scenario>().is_err());
    }
}
