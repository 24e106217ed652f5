use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::usecases::payments::{PaymentError, TransitionOutcome};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a non-transition outcome onto the error envelope.
    pub fn from_outcome(outcome: &TransitionOutcome) -> Option<Self> {
        match outcome {
            TransitionOutcome::Transitioned(_) | TransitionOutcome::StillPending => None,
            TransitionOutcome::NotFound => Some(AppError::NotFound("payment not found".to_string())),
            TransitionOutcome::AlreadyFinalized(status) => Some(AppError::Conflict(format!(
                "payment is already {status}"
            ))),
            TransitionOutcome::InvalidRemoteStatus(value) => Some(AppError::Unprocessable(format!(
                "remote status {value:?} is not a final status"
            ))),
            TransitionOutcome::NotReconcilable => Some(AppError::Unprocessable(
                "payment has no processor transaction to reconcile".to_string(),
            )),
            TransitionOutcome::Failed => Some(AppError::Internal(anyhow::anyhow!(
                "payment transition failed"
            ))),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(message) => AppError::BadRequest(message),
            PaymentError::InvalidAmount => AppError::BadRequest(err.to_string()),
            PaymentError::NotFound(_) => AppError::NotFound(err.to_string()),
            PaymentError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            AppError::Unauthorized => self.to_string(),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unprocessable(msg) => msg,
            // Don't leak internal error detail to client
            AppError::Internal(_) => "Internal server error".to_string(),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
