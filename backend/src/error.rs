//! Error handling for the Farm Operations Management Platform

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation failed: {0:?}")]
    ValidationErrors(Vec<String>),

    /// Stage timestamps out of chronological order; the message names
    /// both offending stages
    #[error("Stage sequence violation: {0:?}")]
    SequenceViolation(Vec<String>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Seed lot depleted: {0}")]
    LotDepleted(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                    violations: None,
                },
            ),
            AppError::ValidationErrors(violations) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: "One or more validation rules failed".to_string(),
                    field: None,
                    violations: Some(violations.clone()),
                },
            ),
            AppError::SequenceViolation(violations) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "SEQUENCE_VIOLATION".to_string(),
                    message: "Stage timestamps are out of chronological order".to_string(),
                    field: None,
                    violations: Some(violations.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                    violations: None,
                },
            ),
            AppError::LotDepleted(lot) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "LOT_DEPLETED".to_string(),
                    message: format!("Seed lot {} is depleted", lot),
                    field: None,
                    violations: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                    violations: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                    violations: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                    violations: None,
                },
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
