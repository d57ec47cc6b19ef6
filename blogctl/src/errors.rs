use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload larger than the configured limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict error, e.g. a name or slug that is already taken
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                e if e.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some("users") => "This username is already taken".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                // Client errors describe the caller's own input
                e if e.is_client_error() => e.to_string(),
                _ => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(db_err) if !db_err.is_client_error() && !matches!(db_err, DbError::NotFound | DbError::UniqueViolation { .. }) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Conflict { message } => (status, axum::response::Json(json!({ "message": message }))).into_response(),
            Error::Database(DbError::UniqueViolation { table, .. }) => {
                let resource = table.as_deref().unwrap_or("unknown");
                let body = json!({
                    "message": self.user_message(),
                    "resource": resource
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapper_errors_map_to_status_codes() {
        let cases = [
            (DbError::InvalidArgument { message: "page".into() }, StatusCode::BAD_REQUEST),
            (DbError::MissingKey { table: "posts".into() }, StatusCode::BAD_REQUEST),
            (
                DbError::TypeMismatch {
                    column: "id".into(),
                    message: "text".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                DbError::UnsupportedExpression { message: "empty".into() },
                StatusCode::BAD_REQUEST,
            ),
            (DbError::NotFound, StatusCode::NOT_FOUND),
            (
                DbError::UniqueViolation {
                    constraint: None,
                    table: Some("tags".into()),
                    message: "dup".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                DbError::TypeConversion {
                    column: "status".into(),
                    message: "bad".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DbError::MissingColumn {
                    table: "tags".into(),
                    column: "name".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (db_err, status) in cases {
            assert_eq!(Error::Database(db_err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let err = Error::Database(DbError::Other(anyhow::anyhow!("connection refused to 10.0.0.3")));
        assert_eq!(err.user_message(), "Database error occurred");

        let err = Error::Internal {
            operation: "hash password".into(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_client_errors_explain_themselves() {
        let err = Error::Database(DbError::InvalidArgument {
            message: "page must be at least 1".into(),
        });
        assert_eq!(err.user_message(), "page must be at least 1");
        assert_eq!(
            Error::Unauthenticated { message: None }.user_message(),
            "Authentication required"
        );

        let err = Error::PayloadTooLarge {
            message: "Image exceeds 10 bytes".into(),
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.user_message(), "Image exceeds 10 bytes");
    }
}
