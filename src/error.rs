use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::repository::RepositoryError;
use crate::scheduler::SchedulerError;
use crate::sync::SyncError;

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Logs the underlying error and hides it behind a generic message.
    pub fn internal<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        AppError::internal(value)
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::AlreadyRunning => AppError::conflict(value.to_string()),
            other => AppError::internal(other),
        }
    }
}

impl From<SchedulerError> for AppError {
    fn from(value: SchedulerError) -> Self {
        match value {
            SchedulerError::InvalidSchedule { .. } => AppError::bad_request(value.to_string()),
            SchedulerError::Sync(err) => AppError::from(err),
            other => AppError::internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}
