//! Error type shared by the HTTP layer and the outbound clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("invalid token")]
    Unauthorized,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidSignature | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            // Callers without the token should not learn the endpoint exists.
            Error::Unauthorized => StatusCode::NOT_FOUND,
            Error::Http(_) | Error::Upstream { .. } | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), "request failed: {}", self);
        match self {
            Error::Unauthorized => status.into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}
