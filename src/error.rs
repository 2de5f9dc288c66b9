use crate::lookup::LookupError;
use crate::settings::SettingsError;
use crate::store::StoreError;
use crate::visitor::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use serde::Serialize;
use thiserror::Error;

/// JSON body of every non-data answer: `{"status": "ok"|"error", "message"}`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "ok".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Validation(e) => AppError::Validation(e),
            SettingsError::Store(e) => AppError::Store(e),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            AppError::Lookup(LookupError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Lookup(LookupError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            AppError::Lookup(LookupError::Superseded) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (status, Json(StatusResponse::error(self.to_string()))).into_response()
    }
}
