//! Session fixtures: server under test, browser engine and per-scenario pages

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::expected::ExpectedResults;
use crate::page::BrowserPage;
use crate::playwright::{PlaywrightBrowser, PlaywrightPage};
use crate::scenarios::{Scenario, ScenarioContext};
use crate::server::ServerHandle;

/// Live environment shared read-only by every scenario in a session
pub struct Harness {
    config: HarnessConfig,
    expected: ExpectedResults,
    server: ServerHandle,
    browser: PlaywrightBrowser,
}

impl Harness {
    /// Load expectations, start and verify the server, then launch the browser.
    ///
    /// Anything already started is torn down before an error is returned.
    pub async fn start(config: HarnessConfig) -> E2eResult<Self> {
        config.validate()?;

        let expected = ExpectedResults::load(&config.paths.expected_results_path())?;

        let mut server = ServerHandle::spawn(&config.server, &config.base_url).await?;

        let browser = match PlaywrightBrowser::launch(&config.browser).await {
            Ok(browser) => browser,
            Err(e) => {
                error!("Browser failed to start: {}", e);
                if let Err(stop_err) = server.stop().await {
                    warn!("Failed to stop server after browser failure: {}", stop_err);
                }
                return Err(e);
            }
        };

        info!("Harness ready at {}", config.base_url);
        Ok(Self {
            config,
            expected,
            server,
            browser,
        })
    }

    pub fn base_url(&self) -> &str {
        self.server.base_url()
    }

    /// Open a fresh page in its own browser context
    pub async fn open_page(&self) -> E2eResult<PlaywrightPage> {
        info!("Creating new page");
        self.browser.new_page().await
    }

    pub fn context<'a>(&'a self, page: &'a dyn BrowserPage) -> ScenarioContext<'a> {
        ScenarioContext {
            page,
            base_url: self.base_url(),
            expected: &self.expected,
            paths: &self.config.paths,
            wait_timeout: self.config.wait_timeout(),
        }
    }

    /// Run one scenario on its own page; the page is closed whatever the outcome.
    pub async fn run_scenario(&self, scenario: Scenario) -> E2eResult<()> {
        self.with_page(move |ctx| scenario.run(ctx).boxed_local()).await
    }

    /// Open a page, run `body` against it and close the page even if `body`
    /// fails or panics. A panic becomes [`E2eError::AssertionFailed`].
    async fn with_page<F>(&self, body: F) -> E2eResult<()>
    where
        F: for<'c> FnOnce(&'c ScenarioContext<'c>) -> LocalBoxFuture<'c, E2eResult<()>>,
    {
        let page = self.open_page().await?;

        let context = self.context(&page);
        let outcome = AssertUnwindSafe(body(&context)).catch_unwind().await;

        info!("Closing page");
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }

        outcome.unwrap_or_else(|panic| {
            Err(E2eError::AssertionFailed(format!(
                "scenario panicked: {}",
                panic_message(panic.as_ref())
            )))
        })
    }

    /// Close the browser, then stop the server. Both always run; the first
    /// error is returned.
    pub async fn shutdown(self) -> E2eResult<()> {
        let Harness {
            mut server, browser, ..
        } = self;

        let browser_result = browser.close().await;
        if let Err(e) = &browser_result {
            warn!("Failed to close browser: {}", e);
        }

        let server_result = server.stop().await;
        if let Err(e) = &server_result {
            warn!("Failed to stop server: {}", e);
        }

        browser_result.and(server_result)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
