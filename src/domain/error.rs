use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Top-level error type for LLMLab. Variants line up with §7's error taxonomy:
/// each one maps to a fixed HTTP status and propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum LlmLabError {
    #[error("auth: {0}")]
    Auth(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A non-2xx response from the upstream provider, forwarded verbatim.
    #[error("upstream error: status {status}")]
    Upstream {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    },

    #[error("transport: {0}")]
    Transport(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LlmLabError>;

impl LlmLabError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for LlmLabError {
    fn into_response(self) -> Response {
        match self {
            LlmLabError::Upstream {
                status,
                mut headers,
                body,
            } => {
                // Passed through verbatim per §4.6/§7: same status, same body.
                headers.remove(axum::http::header::CONTENT_LENGTH);
                let mut resp = (status, body).into_response();
                *resp.headers_mut() = headers;
                resp
            }
            other => {
                let status = match &other {
                    LlmLabError::Auth(_) => StatusCode::UNAUTHORIZED,
                    LlmLabError::Validation(_) => StatusCode::BAD_REQUEST,
                    LlmLabError::NotFound(_) => StatusCode::NOT_FOUND,
                    LlmLabError::Conflict(_) => StatusCode::BAD_REQUEST,
                    LlmLabError::Transport(_) => StatusCode::BAD_GATEWAY,
                    LlmLabError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    LlmLabError::Upstream { .. } => unreachable!(),
                };
                if matches!(other, LlmLabError::Internal(_)) {
                    tracing::error!(error = %other, "internal error");
                }
                let body = ErrorBody {
                    success: false,
                    error: other.to_string(),
                };
                (status, axum::Json(body)).into_response()
            }
        }
    }
}

impl From<sqlx::Error> for LlmLabError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => LlmLabError::NotFound("row not found".into()),
            other => LlmLabError::Internal(format!("database error: {other}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for LlmLabError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        LlmLabError::Internal(format!("migration error: {e}"))
    }
}

impl From<reqwest::Error> for LlmLabError {
    fn from(e: reqwest::Error) -> Self {
        LlmLabError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for LlmLabError {
    fn from(e: serde_json::Error) -> Self {
        LlmLabError::Validation(format!("invalid json: {e}"))
    }
}
