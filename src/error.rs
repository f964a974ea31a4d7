use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The relay's error taxonomy. Status mapping follows the original's
/// `IsNotFoundErr`/`IsBadRequestErr` split: everything else collapses to 500, so callers
/// can't distinguish a write failure from a malformed upstream reply by status code alone
/// -- the `message` field carries that detail instead.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::UNAUTHORIZED,
            RelayError::Transport(_) | RelayError::Upstream(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: u16,
    method: String,
    uri: String,
}

/// Pairs a `RelayError` with the request it occurred on so the JSON body can carry
/// `method`/`uri`, matching the original's `api/internal.Error` shape.
pub struct HttpError {
    pub error: RelayError,
    pub method: String,
    pub uri: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        log::warn!("{} {} -> {status}: {}", self.method, self.uri, self.error);
        let body = ErrorBody { message: self.error.to_string(), code: status.as_u16(), method: self.method, uri: self.uri };
        (status, Json(body)).into_response()
    }
}
