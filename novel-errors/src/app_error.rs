use serde::{Deserialize, Serialize};

pub const RATE_LIMIT_MESSAGE: &str = "You have reached your request limit for the day.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit reached ({remaining}/{limit} left, resets at {reset})")]
    RateLimited { limit: u64, remaining: u64, reset: i64 },

    #[error("Counter store failed: {0}")]
    CounterStore(String),

    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("Completion API returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "The request body must be JSON with a string `prompt` field.",
            Self::RateLimited { .. } => RATE_LIMIT_MESSAGE,
            Self::Completion(_) | Self::UpstreamStatus { .. } => {
                "The completion service is unavailable. Try again later."
            }
            Self::CounterStore(_) | Self::Config(_) | Self::Internal(_) => {
                "Something went wrong on our side. Try again later."
            }
        }
    }
}

#[cfg(feature = "axum")]
mod axum_impl {
    use super::AppError;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    #[derive(serde::Serialize)]
    struct ErrorResponse {
        message: String,
    }

    impl AppError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                AppError::Completion(_) | AppError::UpstreamStatus { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                AppError::CounterStore(_) | AppError::Config(_) | AppError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = self.status_code();
            match &self {
                AppError::RateLimited {
                    limit,
                    remaining,
                    reset,
                } => {
                    let mut response = (status, self.user_message().to_string()).into_response();
                    let headers = response.headers_mut();
                    headers.insert("X-RateLimit-Limit", HeaderValue::from(*limit));
                    headers.insert("X-RateLimit-Remaining", HeaderValue::from(*remaining));
                    headers.insert("X-RateLimit-Reset", HeaderValue::from(*reset));
                    response
                }
                _ => {
                    let message = self.user_message().to_string();
                    (status, Json(ErrorResponse { message })).into_response()
                }
            }
        }
    }
}
