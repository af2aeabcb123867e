use crate::services::{asset_store::AssetStoreError, product_service::ProductError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        match &err {
            ProductError::Validation(_) => AppError::bad_request(err.to_string()),
            ProductError::NotFound(_) => AppError::not_found(err.to_string()),
            ProductError::Conflict { .. } => AppError::new(StatusCode::CONFLICT, err.to_string()),
            ProductError::Persistence(inner) => {
                tracing::error!(error = %inner, "product persistence failed");
                AppError::internal("failed to persist product")
            }
        }
    }
}

impl From<AssetStoreError> for AppError {
    fn from(err: AssetStoreError) -> Self {
        match &err {
            AssetStoreError::UnsupportedType(_)
            | AssetStoreError::ContentMismatch(_)
            | AssetStoreError::TooLarge { .. } => {
                AppError::bad_request(err.to_string())
            }
            AssetStoreError::InvalidKey | AssetStoreError::NotFound(_) => {
                AppError::not_found(err.to_string())
            }
            AssetStoreError::Io(inner) => {
                tracing::error!(error = %inner, "asset storage failed");
                AppError::internal("asset storage failed")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
