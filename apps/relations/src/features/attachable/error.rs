use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relation_types::ErrorResponse;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::naming::humanize_key;

pub const VALIDATION_FAILED: &str = "Validation failed";

/// Everything an attachable endpoint can answer with besides success. The
/// causes behind `RelationFailed` and `Internal` are logged where they occur
/// and never reach the client.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },
    #[error("Not found")]
    NotFound,
    #[error("Something went wrong. Are you sure the {} exists?", humanize_key(.param_key))]
    RelationFailed { param_key: String },
    #[error("Internal server error")]
    Internal,
}

impl AttachError {
    pub fn validation(field: &str, message: String) -> Self {
        AttachError::Validation {
            message: VALIDATION_FAILED.into(),
            errors: BTreeMap::from([(field.to_string(), vec![message])]),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AttachError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AttachError::NotFound => StatusCode::NOT_FOUND,
            AttachError::RelationFailed { .. } | AttachError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AttachError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AttachError::Validation { message, errors } => {
                ErrorResponse::new(message).with_errors(errors)
            }
            other => ErrorResponse::new(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AttachError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn relation_failure_hides_cause_behind_hint() {
        let (status, body) = body_of(AttachError::RelationFailed {
            param_key: "user_roles".into(),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({
                "status": "error",
                "message": "Something went wrong. Are you sure the user roles exists?"
            })
        );
    }

    #[tokio::test]
    async fn validation_carries_field_errors() {
        let (status, body) = body_of(AttachError::validation(
            "roles",
            "The roles field is required.".into(),
        ))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["roles"][0], "The roles field is required.");
    }

    #[tokio::test]
    async fn not_found_and_internal_have_no_detail() {
        let (status, body) = body_of(AttachError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("errors").is_none());

        let (status, body) = body_of(AttachError::Internal).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }
}
