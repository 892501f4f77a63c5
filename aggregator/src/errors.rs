use http::StatusCode;
use hyper::Response;
use hyper::body::Bytes;
use shared::http::{make_error_response, make_text_response};
use thiserror::Error;

/// Result type alias for aggregator operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors that can occur while serving a gateway request
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("User is not found")]
    NotFound,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Downstream responded with status {0}")]
    DownstreamStatus(StatusCode),

    #[error("Failed to decode downstream response: {0}")]
    Decode(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing response. Only input validation messages are echoed back;
    /// everything else collapses to the canonical reason phrase.
    pub fn into_response(self) -> Response<Bytes> {
        match &self {
            GatewayError::BadRequest(message) => {
                make_text_response(StatusCode::BAD_REQUEST, message)
            }
            GatewayError::NotFound => {
                make_text_response(StatusCode::NOT_FOUND, "User is not found")
            }
            _ => make_error_response(self.status_code()),
        }
    }
}
