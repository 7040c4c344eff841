use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use enermarket_core::{ErrorCategory, ErrorKind, MarketError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Stable code reported in the body and in request metrics
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Market(err) => err.kind().code(),
            AppError::Internal(_) => ErrorKind::Internal.code(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind.category() {
        ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCategory::BusinessRule => match kind {
            ErrorKind::NotOfferOwner | ErrorKind::NotPurchaseOwner | ErrorKind::CannotPurchaseOwnOffer => {
                StatusCode::FORBIDDEN
            }
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Market(err) => {
                let status = status_for(err.kind());
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    (status, "Internal Server Error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "kind": code,
                "message": message,
            },
        }));

        (status, body).into_response()
    }
}
