use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request body that could not be read as the expected JSON
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathRejection),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider refused the request on content-policy grounds
    #[error("{0}")]
    ContentBlocked(String),

    /// The provider could not serve the request after the retry budget was spent
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidBody(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            AppError::InvalidPath(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            AppError::ContentBlocked(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Cache(_) | AppError::Config(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Raw failure of a single provider attempt.
///
/// Never leaves the governor: the retrier classifies it and turns it into an
/// [`Outcome`](crate::governor::Outcome).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// Provider or transport reported an error; the text is what gets classified
    #[error("{0}")]
    Api(String),

    /// The call succeeded but carried no generated text
    #[error("provider returned no generated text")]
    EmptyPayload,
}

impl ProviderFailure {
    pub fn api(message: impl Into<String>) -> Self {
        ProviderFailure::Api(message.into())
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderFailure::Api(format!("request timed out: {}", e))
        } else if e.is_connect() {
            ProviderFailure::Api(format!("connection failed: {}", e))
        } else if let Some(status) = e.status() {
            ProviderFailure::Api(format!("HTTP {}: {}", status.as_u16(), e))
        } else {
            ProviderFailure::Api(format!("request failed: {}", e))
        }
    }
}
