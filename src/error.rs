use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Browser acquisition failed: {0}")]
    Acquisition(String),

    #[error("Navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out during {stage} after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Render artifact not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("Browser disconnected while job '{0}' was in flight")]
    Disconnected(String),

    #[error("Render pool is busy: no slot freed for job '{0}' within the admission deadline")]
    Busy(String),

    #[error("Render pool is closed")]
    Closed,

    #[error("Invalid render request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),
}

impl RenderError {
    pub fn engine(message: impl Into<String>) -> Self {
        RenderError::Engine(message.into())
    }

    pub fn acquisition(message: impl Into<String>) -> Self {
        RenderError::Acquisition(message.into())
    }

    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn timeout(stage: &'static str, after: Duration) -> Self {
        RenderError::Timeout { stage, after }
    }

    /// Whether the error indicates the shared browser handle is gone and a
    /// forced restart should be considered.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RenderError::Disconnected(_) => true,
            RenderError::Engine(msg) => {
                let lower = msg.to_ascii_lowercase();
                lower.contains("connection is closed")
                    || lower.contains("connection closed")
                    || lower.contains("browser closed")
            }
            _ => false,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            RenderError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            RenderError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Request,
                e.to_string(),
                "Verify URL format (e.g., https://example.com).",
            ),
            RenderError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with RUST_LOG=debug for details.",
            ),
            RenderError::Image(e) => ErrorPayload::new(
                ErrorCategory::Render,
                e.to_string(),
                "Verify the captured image data; try png instead of jpeg.",
            ),
            RenderError::Engine(msg) | RenderError::Acquisition(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("no such file") || lower.contains("executable") {
                    ErrorPayload::new(
                        ErrorCategory::Engine,
                        msg.to_string(),
                        "Install Chromium/Chrome or point engine.executable at the binary.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Engine,
                        msg.to_string(),
                        "Check that the browser can start (flags, sandbox, memory) and retry.",
                    )
                }
            }
            RenderError::Navigation { url, message } => ErrorPayload::new(
                ErrorCategory::Render,
                format!("Navigation to {} failed: {}", url, message),
                "Ensure the page loads without blocking; increase --nav-timeout if slow.",
            ),
            RenderError::Timeout { stage, after } => ErrorPayload::new(
                ErrorCategory::Render,
                format!("Timed out during {} after {:?}", stage, after),
                "Increase the relevant timeout or simplify the page.",
            ),
            RenderError::MissingArtifact(path) => ErrorPayload::new(
                ErrorCategory::Request,
                format!("Render artifact not found: {}", path.display()),
                "Verify the template produced a file at this path before rendering.",
            ),
            RenderError::Disconnected(name) => ErrorPayload::new(
                ErrorCategory::Engine,
                format!("Browser disconnected while '{}' was in flight", name),
                "The pool restarts automatically; retry the render.",
            ),
            RenderError::Busy(name) => ErrorPayload::new(
                ErrorCategory::Capacity,
                format!("No render slot freed for '{}' in time", name),
                "Lower concurrency pressure or raise max_concurrent.",
            ),
            RenderError::Closed => ErrorPayload::new(
                ErrorCategory::Capacity,
                "Render pool is closed".to_string(),
                "The process is shutting down; no further renders are accepted.",
            ),
            RenderError::InvalidRequest(msg) => ErrorPayload::new(
                ErrorCategory::Request,
                msg.to_string(),
                "Check request fields (viewport, quality, clip vs fullPage).",
            ),
            RenderError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check the config file and CLI flags.",
            ),
            RenderError::Registry(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check the registry state path; the pool still works without it.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Engine,
    Render,
    Request,
    Capacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
