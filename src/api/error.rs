//! Error taxonomy shared by all API handlers.
//!
//! Handlers catch everything at their boundary and translate it here;
//! nothing unstructured reaches a client. Internal detail is logged only,
//! never serialized into a response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// One field-level problem in a 400 response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// JSON body for every non-2xx API response: `{error, issues?}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ValidationIssue>>,
}

/// The failure classes an API handler may answer with.
#[derive(Debug)]
pub enum ApiError {
    /// No or invalid session.
    Unauthorized,
    /// Login with a wrong or unknown email/password pair.
    Credentials,
    /// Valid session, insufficient role or plan.
    Forbidden,
    /// Malformed request body.
    Validation(Vec<ValidationIssue>),
    /// A request-level problem with a safe, user-facing message.
    BadRequest(&'static str),
    /// Referenced entity absent.
    NotFound,
    /// Duplicate of an existing entity.
    Conflict(&'static str),
    /// Throttled by the rate limiter.
    RateLimited,
    /// Data-store or upstream failure; detail is logged, not returned.
    Internal(anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation(vec![ValidationIssue::new(field, message)])
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Authentication required".to_string(),
                    issues: None,
                },
            ),
            Self::Credentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Invalid credentials".to_string(),
                    issues: None,
                },
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    error: "Forbidden".to_string(),
                    issues: None,
                },
            ),
            Self::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Invalid request".to_string(),
                    issues: Some(issues),
                },
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message.to_string(),
                    issues: None,
                },
            ),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "Not found".to_string(),
                    issues: None,
                },
            ),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: message.to_string(),
                    issues: None,
                },
            ),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: "Rate limited".to_string(),
                    issues: None,
                },
            ),
            Self::Internal(err) => {
                error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal server error".to_string(),
                        issues: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::validation("email", "required")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Credentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Conflict("Email already registered")
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("db exploded"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_body_carries_issues() {
        let body = ErrorBody {
            error: "Invalid request".to_string(),
            issues: Some(vec![ValidationIssue::new("email", "Invalid email")]),
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["issues"][0]["field"], "email");
    }

    #[test]
    fn plain_errors_omit_issues() {
        let body = ErrorBody {
            error: "Forbidden".to_string(),
            issues: None,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value.get("issues").is_none());
    }
}
