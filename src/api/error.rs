//! Errors raised while talking to the clinic backend.

/// API-level errors. `Server` carries the backend's own message, which is
/// what the user sees; the others are transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Clinic server is not reachable at {0}")]
    Connection(String),
    #[error("HTTP client error: {0}")]
    HttpClient(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
    #[error("Server response carried no data")]
    MissingData,
}

impl ApiError {
    /// Business error reported by the backend (HTTP 4xx/5xx or a non-200
    /// envelope status), as opposed to a transport failure.
    pub fn is_server_reported(&self) -> bool {
        matches!(self, ApiError::Server { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_connect() {
            ApiError::Connection(base_url.to_string())
        } else if err.is_timeout() {
            ApiError::HttpClient(format!("Request timed out: {err}"))
        } else if err.is_decode() {
            ApiError::ResponseParsing(err.to_string())
        } else {
            ApiError::HttpClient(err.to_string())
        }
    }
}
