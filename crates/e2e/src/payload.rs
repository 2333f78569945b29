//! Upload result payload rendered into the page's results area

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{status, data?, errors?}` as produced by the server under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub status: UploadStatus,

    /// Ingested records (present on success)
    #[serde(default)]
    pub data: Option<Vec<serde_json::Value>>,

    /// Validation messages (present on error)
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl UploadResult {
    /// Parse the text content of the results area.
    pub fn parse(text: &str) -> E2eResult<Self> {
        serde_json::from_str(text.trim()).map_err(|e| E2eError::MalformedResultPayload {
            reason: e.to_string(),
            payload: text.to_string(),
        })
    }

    /// Ingested records; an absent `data` field fails the scenario.
    pub fn records(&self) -> E2eResult<&[serde_json::Value]> {
        self.data.as_deref().ok_or_else(|| {
            E2eError::AssertionFailed(format!("'{}' result has no 'data' field", self.status))
        })
    }

    /// Error messages; an absent `errors` field fails the scenario.
    pub fn error_messages(&self) -> E2eResult<&[String]> {
        self.errors.as_deref().ok_or_else(|| {
            E2eError::AssertionFailed(format!("'{}' result has no 'errors' field", self.status))
        })
    }
}
