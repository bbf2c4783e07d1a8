use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Insufficient coins")]
    InsufficientCoins,

    #[error("Upgrade already at max level")]
    MaxLevel,

    #[error("Upgrade level changed, try again")]
    LevelChanged,

    #[error("Daily reward already claimed or not available")]
    AlreadyClaimed,

    #[error("User already referred")]
    AlreadyReferred,

    #[error("Cannot refer yourself")]
    SelfReferral,

    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::InsufficientCoins
            | ApiError::SelfReferral
            | ApiError::InvalidReferralCode => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MaxLevel
            | ApiError::LevelChanged
            | ApiError::AlreadyClaimed
            | ApiError::AlreadyReferred => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage failures are logged in full but never echoed to the client.
        let message = match self {
            ApiError::Database(e) => {
                log::error!("database failure: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
