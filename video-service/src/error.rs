use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Validation,
    Upstream,
    RateLimit,
    Storage,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not authenticated")]
    Authentication,

    #[error("{0}")]
    Validation(String),

    #[error("CDN responded with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("CDN request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Rate limit exceeded. Please try again in {retry_after_secs} seconds.")]
    RateLimit { retry_after_secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Authentication => ErrorKind::Authentication,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Upstream { .. } | AppError::Transport(_) => ErrorKind::Upstream,
            AppError::RateLimit { .. } => ErrorKind::RateLimit,
            AppError::Database(_) | AppError::Connection(_) => ErrorKind::Storage,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // storage and internal details stay in the logs
        let message = match self.kind() {
            ErrorKind::Storage | ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ErrorBody { kind: self.kind(), message })).into_response()
    }
}
