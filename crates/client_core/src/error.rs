use shared::error::ErrorCode;
use thiserror::Error;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Client-side checks that block an action before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("folder name must not be empty")]
    EmptyFolderName,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("password must be at least {min} characters long")]
    PasswordTooShort { min: usize },
    #[error("'{0}' is not a valid gender (expected Male, Female or Other)")]
    InvalidGender(String),
    #[error("'{0}' is not a valid age")]
    InvalidAge(String),
    #[error("unknown difficulty '{0}' (expected Easy, Medium or Hard)")]
    UnknownDifficulty(String),
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("page {page} is outside 1..={total_pages}")]
    PageOutOfRange { page: u32, total_pages: u32 },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The credential was missing, invalid or expired.
    #[error("session rejected by {endpoint}: {reason}")]
    Auth { endpoint: String, reason: String },
    #[error("{endpoint} returned HTTP {status}: {}", .reason.as_deref().unwrap_or("no details"))]
    Api {
        endpoint: String,
        status: u16,
        code: ErrorCode,
        reason: Option<String>,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{endpoint} did not return a session token")]
    MissingToken { endpoint: String },
    #[error("api base url '{0}' cannot carry request paths")]
    InvalidBaseUrl(String),
}

impl GatewayError {
    pub fn auth(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::Auth {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn api(endpoint: impl Into<String>, status: u16, reason: Option<String>) -> Self {
        GatewayError::Api {
            endpoint: endpoint.into(),
            status,
            code: ErrorCode::from_status(status),
            reason,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GatewayError::Auth { reason, .. } => Some(reason),
            GatewayError::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn display_message(&self) -> String {
        match self {
            GatewayError::Auth { .. } => SESSION_EXPIRED_MESSAGE.to_string(),
            GatewayError::Api {
                reason: Some(reason),
                ..
            } => reason.clone(),
            GatewayError::Api { status, .. } => {
                format!("The server rejected the request (HTTP {status}). Please try again.")
            }
            GatewayError::Transport { .. } => {
                "Server unreachable; check your connection and retry.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("credential store failure: {0}")]
    Credentials(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Gateway(err) if err.is_auth())
    }

    pub fn display_message(&self) -> String {
        match self {
            ClientError::Gateway(err) => err.display_message(),
            other => other.to_string(),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
