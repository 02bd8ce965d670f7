//! Failure taxonomy for backend calls.
//!
//! Every remote operation a panel performs resolves to one of four
//! categories. Panels catch these at their boundary and turn them into
//! user-visible notifications; nothing here is fatal to the application.

use thiserror::Error;

/// Result alias for backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// A failed backend interaction, classified by cause.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The backend could not be reached (connection refused, DNS, timeout).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status, or a 2xx whose `status`
    /// field was not `"success"`.
    #[error("backend returned {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Backend { status: u16, detail: Option<String> },

    /// The response arrived but did not have the expected shape.
    #[error("unexpected payload: {0}")]
    Payload(String),

    /// A required user selection was missing; no request was attempted.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// The message to show the user: the backend-supplied detail when there
    /// is one, otherwise the generic description.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Backend {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Transport(_) => ErrorCategory::Transport,
            ApiError::Backend { .. } => ErrorCategory::Backend,
            ApiError::Payload(_) => ErrorCategory::Payload,
            ApiError::Validation(_) => ErrorCategory::Validation,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Payload(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Backend {
                status: status.as_u16(),
                detail: None,
            }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Payload(e.to_string())
    }
}

/// The four failure categories, used to pick a notification title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Transport,
    Backend,
    Payload,
    Validation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_backend_message() {
        let err = ApiError::Backend {
            status: 500,
            detail: Some("Band IMG_TIR1 not found".into()),
        };
        assert_eq!(err.detail(), "Band IMG_TIR1 not found");
    }

    #[test]
    fn detail_falls_back_to_generic_message() {
        let err = ApiError::Backend {
            status: 404,
            detail: None,
        };
        assert_eq!(err.detail(), "backend returned 404");

        let blank = ApiError::Backend {
            status: 502,
            detail: Some("  ".into()),
        };
        assert_eq!(blank.detail(), "backend returned 502:   ");
    }

    #[test]
    fn categories_are_distinct() {
        let errors = [
            ApiError::Transport("refused".into()),
            ApiError::Backend {
                status: 500,
                detail: None,
            },
            ApiError::Payload("missing data".into()),
            ApiError::Validation("pick a band".into()),
        ];
        let categories: std::collections::HashSet<_> =
            errors.iter().map(ApiError::category).collect();
        assert_eq!(categories.len(), 4);
    }
}
