// HTTP-boundary error type. Every handler failure becomes `{"error": msg}`.

use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db::DbError;
use crate::narrative::llm::LlmError;
use crate::rate_limit::RateLimitError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{context}")]
    Upstream {
        context: &'static str,
        #[source]
        source: LlmError,
    },
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Wrap a text-generation failure with the user-facing message.
    pub fn upstream(context: &'static str) -> impl FnOnce(LlmError) -> Self {
        move |source| AppError::Upstream { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Session(e) => match e {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::InvalidChoice { .. } => StatusCode::BAD_REQUEST,
                SessionError::OutOfOrder { .. }
                | SessionError::Missing { .. }
                | SessionError::AlreadyScored => StatusCode::CONFLICT,
            },
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::InvalidInput(msg) => AppError::InvalidInput(msg),
            e @ DbError::UnknownUser(_) => AppError::NotFound(e.to_string()),
            e @ DbError::DuplicateEmail(_) => AppError::Conflict(e.to_string()),
            DbError::Sqlx(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                json!({ "error": "Internal server error" })
            }
            AppError::Upstream { context, source } => {
                tracing::error!("{context}: {source}");
                json!({ "error": context })
            }
            AppError::Session(e) => match e.redirect() {
                Some(redirect) => json!({ "error": e.to_string(), "redirect": redirect }),
                None => json!({ "error": e.to_string() }),
            },
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_input_is_400() {
        let (status, body) = body_of(AppError::invalid("Missing required fields")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn test_database_error_is_masked() {
        let (status, body) = body_of(AppError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_upstream_uses_context_message() {
        let err = AppError::upstream("Failed to generate counter move")(LlmError::NotConfigured);
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to generate counter move");
    }

    #[tokio::test]
    async fn test_session_error_carries_redirect() {
        let (status, body) = body_of(AppError::Session(SessionError::AlreadyScored)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, _) = body_of(AppError::Session(SessionError::NotFound(uuid::Uuid::nil()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_db_error_mapping() {
        assert_eq!(
            AppError::from(DbError::UnknownUser(4)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(DbError::DuplicateEmail("a@b.c".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(DbError::InvalidInput("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
