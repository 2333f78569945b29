//! Page Object for the product upload page
//!
//! [`UploadPage`] carries its position in the page lifecycle as a type
//! parameter:
//!
//! ```text
//! Unloaded --navigate--> Loaded --upload_file--> Submitted (results available)
//!     ^                                              |
//!     +----------------- navigate -------------------+
//! ```
//!
//! Uploading before the page has loaded, or reading results before an upload,
//! does not compile.

use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{E2eError, E2eResult};
use crate::payload::UploadResult;

/// Browser primitives the Page Object needs
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Suspend until `selector` matches a visible element, failing with
    /// [`E2eError::Timeout`] after `timeout`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()>;

    async fn set_input_files(&self, selector: &str, path: &Path) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    async fn inner_text(&self, selector: &str) -> E2eResult<String>;
}

/// Element selectors used by the upload page
#[derive(Debug, Clone)]
pub struct Locators {
    pub file_input: String,
    pub submit_button: String,
    pub results_area: String,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            file_input: r#"input[type="file"]"#.to_string(),
            submit_button: r#"button[type="submit"]"#.to_string(),
            results_area: "#results".to_string(),
        }
    }
}

impl Locators {
    /// Matches the results area once the server response has been rendered
    pub fn results_ready(&self) -> String {
        format!("{}:not(:empty)", self.results_area)
    }
}

/// Page has not been navigated yet
#[derive(Debug)]
pub struct Unloaded;

/// Upload form is present
#[derive(Debug)]
pub struct Loaded;

/// A file was submitted and the results area is populated
#[derive(Debug)]
pub struct Submitted;

pub struct UploadPage<'p, P: ?Sized, S = Unloaded> {
    page: &'p P,
    base_url: String,
    locators: Locators,
    wait_timeout: Duration,
    _state: PhantomData<S>,
}

impl<'p, P: BrowserPage + ?Sized> UploadPage<'p, P, Unloaded> {
    pub fn new(page: &'p P, base_url: impl Into<String>) -> Self {
        Self {
            page,
            base_url: base_url.into(),
            locators: Locators::default(),
            wait_timeout: Duration::from_secs(30),
            _state: PhantomData,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl<'p, P: BrowserPage + ?Sized, S> UploadPage<'p, P, S> {
    fn into_state<T>(self) -> UploadPage<'p, P, T> {
        UploadPage {
            page: self.page,
            base_url: self.base_url,
            locators: self.locators,
            wait_timeout: self.wait_timeout,
            _state: PhantomData,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Navigate to the upload page and wait for the file input.
    ///
    /// From a submitted page this reloads the form, discarding previous results.
    pub async fn navigate(self) -> E2eResult<UploadPage<'p, P, Loaded>> {
        info!("Navigating to {}", self.base_url);
        let loaded = match self.page.goto(&self.base_url).await {
            Ok(()) => {
                self.page
                    .wait_for_selector(&self.locators.file_input, self.wait_timeout)
                    .await
            }
            Err(e) => Err(e),
        };

        match loaded {
            Ok(()) => Ok(self.into_state()),
            Err(E2eError::Timeout(reason)) => Err(E2eError::PageNotLoaded {
                url: self.base_url,
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    /// Readiness probe: `true` once the file input is present, `false` on any
    /// failure. Never returns an error.
    pub async fn is_page_loaded(&self) -> bool {
        info!("Checking if page is loaded");
        match self
            .page
            .wait_for_selector(&self.locators.file_input, self.wait_timeout)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Page load check failed: {}", e);
                false
            }
        }
    }
}

impl<'p, P: BrowserPage + ?Sized> UploadPage<'p, P, Loaded> {
    /// Submit `path` through the upload form and wait for results to render.
    pub async fn upload_file(self, path: &Path) -> E2eResult<UploadPage<'p, P, Submitted>> {
        info!("Uploading file: {}", path.display());

        self.page.set_input_files(&self.locators.file_input, path).await?;
        self.page.click(&self.locators.submit_button).await?;

        info!("Waiting for results to appear");
        self.page
            .wait_for_selector(&self.locators.results_ready(), self.wait_timeout)
            .await?;

        Ok(self.into_state())
    }
}

impl<'p, P: BrowserPage + ?Sized> UploadPage<'p, P, Submitted> {
    /// Parse the JSON rendered into the results area
    pub async fn get_results(&self) -> E2eResult<UploadResult> {
        info!("Getting results from the page");
        let text = self.page.inner_text(&self.locators.results_area).await?;
        let results = UploadResult::parse(&text)?;
        debug!("Parsed results: {:?}", results);
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory page used by unit tests

    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeState {
        url: Option<String>,
        selected: Option<PathBuf>,
        results: Option<String>,
        calls: Vec<String>,
    }

    /// Renders a canned response per uploaded file name
    #[derive(Default)]
    pub struct FakePage {
        state: Mutex<FakeState>,
        responses: HashMap<String, String>,
        form_present: bool,
        submit_renders: bool,
    }

    impl FakePage {
        pub fn new() -> Self {
            Self {
                form_present: true,
                submit_renders: true,
                ..Default::default()
            }
        }

        /// The upload form never appears
        pub fn without_form(mut self) -> Self {
            self.form_present = false;
            self
        }

        /// Submitting leaves the results area empty
        pub fn without_results(mut self) -> Self {
            self.submit_renders = false;
            self
        }

        pub fn respond(mut self, file_name: &str, body: &str) -> Self {
            self.responses.insert(file_name.to_string(), body.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn uploaded(&self) -> Option<PathBuf> {
            self.state.lock().unwrap().selected.clone()
        }
    }

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn goto(&self, url: &str) -> E2eResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("goto:{url}"));
            state.url = Some(url.to_string());
            state.selected = None;
            state.results = None;
            Ok(())
        }

        async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> E2eResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("wait:{selector}"));
            let present = if selector.ends_with(":not(:empty)") {
                state.results.as_deref().is_some_and(|r| !r.is_empty())
            } else {
                state.url.is_some() && self.form_present
            };
            if present {
                Ok(())
            } else {
                Err(E2eError::Timeout(selector.to_string()))
            }
        }

        async fn set_input_files(&self, selector: &str, path: &Path) -> E2eResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("set_input_files:{selector}"));
            state.selected = Some(path.to_path_buf());
            Ok(())
        }

        async fn click(&self, selector: &str) -> E2eResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("click:{selector}"));
            if !self.submit_renders {
                return Ok(());
            }
            let name = state
                .selected
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            state.results = self.responses.get(&name).cloned();
            Ok(())
        }

        async fn inner_text(&self, selector: &str) -> E2eResult<String> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("inner_text:{selector}"));
            Ok(state.results.clone().unwrap_or_default())
        }
    }
}
