pub mod product;
pub mod remote;
pub mod steps;

pub use product::*;
pub use remote::*;
pub use steps::*;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} error: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited by target site")]
    RateLimited,

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Short user-facing message. Full diagnostic context goes to the
    /// structured logger, never into the trigger response.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Http { status, message } => {
                format!("API error: {} (Response Code: {})", message, status)
            }
            SyncError::RateLimited => "Target site is rate limiting requests".to_string(),
            SyncError::Network(_) | SyncError::Request(_) => {
                "Could not reach the target site".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
