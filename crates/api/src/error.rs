use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Transport failure: {message}")]
    Transport {
        status: Option<u16>,
        body: Option<String>,
        message: String,
        timed_out: bool,
    },

    /// The issue's workflow offers no transition to the requested status.
    /// Reported after reading the workflow and before any write.
    #[error(
        "Transition '{target}' is not available for {key}; available: {}",
        list_or_none(.available)
    )]
    TransitionUnavailable {
        key: String,
        target: String,
        available: Vec<String>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    /// Classifies a non-2xx response. `resource` is the request path.
    pub fn from_status(status: StatusCode, resource: &str, body: Option<String>) -> Self {
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound {
                resource: resource.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Authentication {
                status: status.as_u16(),
                message: body.unwrap_or_else(|| "Invalid or expired credentials".to_string()),
            },
            _ => ApiError::Transport {
                status: Some(status.as_u16()),
                message: format!("{resource} returned HTTP {status}"),
                body,
                timed_out: false,
            },
        }
    }

    /// HTTP status attached to the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::Authentication { status, .. } => Some(*status),
            ApiError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport { timed_out: true, .. })
    }

    /// Whether a caller could reasonably try the same call again. The client
    /// itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport {
                timed_out: true, ..
            } => true,
            ApiError::Transport {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            ApiError::Transport { status: None, .. } => true,
            _ => false,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ApiError::Authentication { .. } => {
                Some("Verify your API token using: issuetracker auth status")
            }
            ApiError::NotFound { .. } => Some("Check if the issue key is correct"),
            ApiError::Validation { .. } => Some("Review the command arguments"),
            ApiError::Transport {
                timed_out: true, ..
            } => Some("Check your network connection or raise timeout_secs in the profile"),
            ApiError::Transport {
                status: Some(429), ..
            } => Some("Too many requests; wait before trying again"),
            ApiError::TransitionUnavailable { .. } => {
                Some("List the workflow transitions with: issuetracker issue transition <KEY>")
            }
            ApiError::InvalidUrl(_) => Some("Check the base_url configured for the profile"),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport {
            status: err.status().map(|s| s.as_u16()),
            body: None,
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
