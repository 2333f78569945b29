//! Catalog upload E2E test framework
//!
//! This crate drives a real browser against the product-catalog upload page:
//! - Spawns the upload server as a subprocess and verifies it with health probes
//! - Controls Playwright through a long-lived Node driver (JSON lines)
//! - Wraps the upload page in a state-typed Page Object
//! - Runs CSV upload scenarios and checks results against a JSON fixture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    └── Harness::start(config)                               │
//! │          ├── ExpectedResults::load()   (fatal on failure)   │
//! │          ├── ServerHandle::spawn()     (fatal on failure)   │
//! │          └── PlaywrightBrowser::launch()                    │
//! │    ├── run_scenario(s) -> page per scenario, always closed  │
//! │    └── shutdown()      -> browser closed, server stopped    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UploadPage<Unloaded> --navigate--> UploadPage<Loaded>      │
//! │    --upload_file--> UploadPage<Submitted> --get_results-->  │
//! │    UploadResult { status, data?, errors? }                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod expected;
pub mod fixture;
pub mod logging;
pub mod page;
pub mod payload;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod server;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use fixture::Harness;
pub use page::{BrowserPage, UploadPage};
pub use runner::TestRunner;
pub use scenarios::Scenario;
