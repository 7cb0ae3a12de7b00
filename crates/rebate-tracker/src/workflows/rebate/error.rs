use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use super::repository::RepositoryError;
use super::status::ApplicationStatus;
use super::storage::StorageError;

/// Error raised by the rebate services.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{message}")]
    Validation {
        reason: &'static str,
        message: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("subject {subject} may not access {entity} {id}")]
    Forbidden {
        entity: &'static str,
        id: String,
        subject: String,
    },
    #[error("request is missing an authenticated subject")]
    Unauthenticated,
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("application {id} moved to {found} before this update; reload and retry")]
    StaleStatus {
        id: String,
        found: ApplicationStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    pub fn validation(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(entity: &'static str, id: impl Display, subject: impl Display) -> Self {
        Self::Forbidden {
            entity,
            id: id.to_string(),
            subject: subject.to_string(),
        }
    }

    /// Machine-stable reason string carried in every error body.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::Validation { reason, .. } => *reason,
            WorkflowError::NotFound { .. } | WorkflowError::Repository(RepositoryError::NotFound) => {
                "not_found"
            }
            WorkflowError::Forbidden { .. } => "forbidden",
            WorkflowError::Unauthenticated => "unauthenticated",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::StaleStatus { .. } => "stale_status",
            WorkflowError::Repository(_) | WorkflowError::Storage(_) => "upstream_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::Validation { .. } | WorkflowError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            WorkflowError::NotFound { .. } | WorkflowError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
            WorkflowError::Unauthenticated => StatusCode::UNAUTHORIZED,
            WorkflowError::StaleStatus { .. } => StatusCode::CONFLICT,
            WorkflowError::Repository(_) | WorkflowError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            WorkflowError::Repository(RepositoryError::NotFound) => "record not found".to_string(),
            WorkflowError::Repository(_) | WorkflowError::Storage(_) => {
                error!(error = %self, "upstream collaborator failed");
                "internal server error".to_string()
            }
            WorkflowError::Forbidden { .. } => {
                warn!(error = %self, "ownership check failed");
                "access denied".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.reason(), "message": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let err = WorkflowError::InvalidTransition {
            from: ApplicationStatus::DocumentsRequested,
            to: ApplicationStatus::Completed,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.reason(), "invalid_transition");
        let message = err.to_string();
        assert!(message.contains("DOCUMENTS_REQUESTED"));
        assert!(message.contains("COMPLETED"));
    }

    #[test]
    fn upstream_errors_map_to_internal_error() {
        let err = WorkflowError::from(RepositoryError::Unavailable("db offline".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason(), "upstream_error");

        let missing = WorkflowError::from(RepositoryError::NotFound);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn forbidden_is_distinct_from_not_found() {
        let err = WorkflowError::forbidden("document", "doc-1", "user_b");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.reason(), "forbidden");
    }
}
