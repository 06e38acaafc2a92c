use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Everything a handler can fail with. The four ledger kinds carry a
/// specific, actionable message; storage and session failures are logged
/// server-side and reported to the client as a generic 500.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidOrder(String),

    #[error("{0}")]
    NotFound(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient shares")]
    InsufficientShares,

    #[error("quote unavailable for {0}")]
    QuoteUnavailable(String),

    #[error("unauthorized access")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::InvalidOrder(_) | Error::InsufficientFunds | Error::InsufficientShares => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::QuoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Storage(_) | Error::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", self);
            return (status, Json("internal server error".to_string())).into_response();
        }

        (status, Json(self.to_string())).into_response()
    }
}
