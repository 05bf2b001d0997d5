use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Uniform error type for handlers and engines. Maps to the `{error: string}`
/// envelope on the HTTP boundary; engines propagate it through `anyhow`-style
/// `?` internally and only wrap at the edge.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("resource exhausted, retry after {retry_after_secs}s")]
    ResourceExhausted { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::ResourceExhausted { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "resource exhausted".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if let AppError::ResourceExhausted { retry_after_secs } = &self {
            response
                .headers_mut()
                .insert("Retry-After", retry_after_secs.to_string().parse().unwrap());
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
