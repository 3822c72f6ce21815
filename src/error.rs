// Copyright 2023 Remi Bernotavicius

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to the messages describing what is wrong with it.
pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid payload: {0:?}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(BTreeMap::from([(field, vec![message.into()])]))
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl From<DieselError> for AppError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => Self::NotFound("not found".into()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(format!("already exists: {}", info.message()))
            }
            e => Self::Internal(Box::new(e)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        Self::invalid("body", e.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        Self::invalid("id", e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        Self::invalid("query", e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } | AppError::Conflict { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::Validation(fields) => json!(fields),
            AppError::Conflict(message) => json!({ "errors": message }),
            AppError::Internal(e) => {
                log::error!("request failed: {e}");
                json!({ "detail": "internal server error" })
            }
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[test]
fn status_codes() {
    let cases = [
        (AppError::invalid("name", "required"), StatusCode::BAD_REQUEST),
        (AppError::Conflict("twice".into()), StatusCode::BAD_REQUEST),
        (AppError::not_found("recipe 3"), StatusCode::NOT_FOUND),
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::Forbidden, StatusCode::FORBIDDEN),
        (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.into_response().status(), status);
    }
}

#[test]
fn unique_violation_is_conflict() {
    let e = DieselError::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new("UNIQUE constraint failed: favorites.user_id".to_string()),
    );
    assert!(matches!(AppError::from(e), AppError::Conflict(_)));
    assert!(matches!(
        AppError::from(DieselError::NotFound),
        AppError::NotFound(_)
    ));
}
