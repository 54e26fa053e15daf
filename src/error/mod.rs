use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Paywall outcomes
    #[error("Payment Required")]
    PaymentRequired { macaroon: String, invoice: String },

    #[error("Invalid L402 credentials")]
    InvalidCredentials,

    #[error("Invalid L402 token format")]
    InvalidTokenFormat,

    // Ownership
    #[error("Invalid edit token")]
    InvalidEditToken,

    #[error("Cross-origin request blocked")]
    CrossOriginBlocked,

    // Domain recovery
    #[error("No active challenge or challenge expired")]
    NoActiveChallenge,

    #[error("Challenge code does not match")]
    ChallengeMismatch,

    #[error("Could not reach {0}")]
    Unreachable(String),

    #[error("Cannot verify domain: hostname resolves to a private or unreachable address")]
    PrivateAddress,

    // Lookup
    #[error("{0} not found")]
    NotFound(String),

    // Rate limiting
    #[error("Rate limit exceeded")]
    RateLimited,

    // Validation errors
    #[error("Validation error")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadInput(String),

    // Payments backend
    #[error("Payment backend error: {0}")]
    PaymentBackend(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // The 402 challenge carries the freshly minted macaroon and invoice
        // in WWW-Authenticate; everything else is a plain {"detail": ...}.
        if let AppError::PaymentRequired { macaroon, invoice } = &self {
            let challenge = format!(r#"L402 macaroon="{}", invoice="{}""#, macaroon, invoice);
            return (
                StatusCode::PAYMENT_REQUIRED,
                [(header::WWW_AUTHENTICATE, challenge)],
                Json(json!({ "detail": "Payment Required" })),
            )
                .into_response();
        }

        let (status, detail) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("An internal database error occurred"),
                )
            }
            AppError::PaymentRequired { .. } => unreachable!(),
            AppError::InvalidCredentials | AppError::InvalidTokenFormat => {
                (StatusCode::UNAUTHORIZED, json!(self.to_string()))
            }
            AppError::InvalidEditToken
            | AppError::CrossOriginBlocked
            | AppError::ChallengeMismatch => (StatusCode::FORBIDDEN, json!(self.to_string())),
            AppError::NoActiveChallenge | AppError::PrivateAddress => {
                (StatusCode::BAD_REQUEST, json!(self.to_string()))
            }
            AppError::Unreachable(_) => (StatusCode::BAD_GATEWAY, json!(self.to_string())),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, json!(self.to_string())),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, json!(self.to_string())),
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::to_value(errors).unwrap_or_else(|_| json!("Validation error")),
            ),
            AppError::BadInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!(msg)),
            AppError::PaymentBackend(msg) => {
                tracing::error!("Payment backend error: {}", msg);
                (StatusCode::BAD_GATEWAY, json!("Payment backend unavailable"))
            }
            AppError::HttpClient(e) => {
                tracing::error!("HTTP client error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    json!("Failed to communicate with external service"),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!("An internal error occurred"))
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
