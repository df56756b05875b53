use serde::{Deserialize, Serialize};

/// Error bodies the API sends for these reasons mean the credential is unusable.
const INVALID_TOKEN_REASONS: &[&str] = &["Invalid token", "No token provided"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            429 => ErrorCode::RateLimited,
            400..=499 => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }
}

/// `{ "error": "...", "message": "..." }`, both optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        non_blank(&self.error).or_else(|| non_blank(&self.message))
    }

    pub fn signals_invalid_token(&self) -> bool {
        self.reason()
            .map(|reason| INVALID_TOKEN_REASONS.contains(&reason.trim()))
            .unwrap_or(false)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|reason| !reason.trim().is_empty())
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
