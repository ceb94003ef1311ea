use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::use_cases::ServiceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Record store error: {0}")]
    RecordStore(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: transaction is {current}")]
    Conflict { current: String },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::RecordStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownUser(user) => {
                AppError::Unauthorized(format!("unknown user {}", user))
            }
            ServiceError::NotFound(id) => AppError::NotFound(format!("transaction {}", id)),
            ServiceError::Conflict { current } => AppError::Conflict { current },
            ServiceError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            ServiceError::RecordStore(msg) => AppError::RecordStore(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let AppError::Conflict { current } = &self {
            body["current"] = json!(current);
        }

        (status, Json(body)).into_response()
    }
}
