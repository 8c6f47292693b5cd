use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use wheel_core::DrawError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("all prizes have been drawn")]
    SoldOut,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<DrawError> for ApiError {
    fn from(err: DrawError) -> Self {
        match err {
            DrawError::EmptyNickname => Self::Validation(err.to_string()),
            DrawError::SoldOut => Self::SoldOut,
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::SoldOut => StatusCode::GONE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Storage(err) => {
                tracing::error!(%err, "ledger storage failed");
                "storage unavailable, please retry".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
