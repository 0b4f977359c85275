use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotError(String),

    #[error("No form found on step {step}")]
    NoFormFound { step: usize },

    #[error("No advance control found on step {step}")]
    AdvanceNotFound { step: usize },

    #[error("A scan or bulk run is already in progress")]
    Busy,

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Mapping store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
