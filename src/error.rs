//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the hard-failure channel for the service. Expected
//! business outcomes (a margin rejection, a categorized feed failure) are
//! typed outcome values instead, see [`crate::service::PriceMatchOutcome`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::RollbackPointId;
use crate::rate_limiter::RateLimiterError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: sku is required",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                   |
/// |-----------|-----------------|-------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request               |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server          | 500 / 503                     |
/// | 4000–4999 | Upstream        | 502 Bad Gateway               |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request validation failed; nothing was sent upstream.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No monitoring configuration exists for the ASIN and owner.
    #[error("no monitoring configuration for {asin} owned by {owner}")]
    ConfigNotFound {
        /// Requested ASIN.
        asin: String,
        /// Requested owner.
        owner: String,
    },

    /// No product pricing record matches the identifier.
    #[error("product record not found: {0}")]
    RecordNotFound(String),

    /// Rollback point with the given ID does not exist.
    #[error("rollback point not found: {0}")]
    RollbackPointNotFound(RollbackPointId),

    /// Rollback point was already consumed.
    #[error("rollback point {0} has already been used")]
    RollbackPointUsed(RollbackPointId),

    /// A monitoring cycle is already executing.
    #[error("a monitoring cycle is already in progress")]
    CycleInProgress,

    /// Marketplace credentials are not configured.
    #[error("marketplace credentials are not configured; an administrator must set them")]
    MissingCredentials,

    /// Feed classification could not be resolved for the SKU.
    #[error("classification unavailable for {sku}: {reason}")]
    ClassificationUnavailable {
        /// SKU being submitted.
        sku: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Competitive pricing could not be fetched.
    #[error("pricing provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The shared feed rate limiter could not run the submission.
    #[error("rate limiter error: {0}")]
    RateLimiter(#[from] RateLimiterError),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::ConfigNotFound { .. } => 2001,
            Self::RecordNotFound(_) => 2002,
            Self::RollbackPointNotFound(_) => 2003,
            Self::RollbackPointUsed(_) => 2004,
            Self::CycleInProgress => 2005,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::MissingCredentials => 3002,
            Self::RateLimiter(_) => 3003,
            Self::ClassificationUnavailable { .. } => 4001,
            Self::ProviderUnavailable(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ConfigNotFound { .. }
            | Self::RecordNotFound(_)
            | Self::RollbackPointNotFound(_) => StatusCode::NOT_FOUND,
            Self::RollbackPointUsed(_) | Self::CycleInProgress => StatusCode::CONFLICT,
            Self::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
            Self::ClassificationUnavailable { .. } | Self::ProviderUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::RateLimiter(_) | Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::MissingCredentials => {
                Some("set MARKETPLACE_CLIENT_ID, MARKETPLACE_CLIENT_SECRET and MARKETPLACE_REFRESH_TOKEN".to_string())
            }
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fall_in_documented_ranges() {
        assert_eq!(ServiceError::InvalidRequest("x".into()).error_code(), 1001);
        assert_eq!(
            ServiceError::RollbackPointUsed(RollbackPointId::new()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::MissingCredentials.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::ProviderUnavailable("empty".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn into_response_uses_status() {
        let response = ServiceError::RecordNotFound("rec-1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
