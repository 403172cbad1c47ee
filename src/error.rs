use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::error;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

/// Application-level error. Handlers return `AppResult` and let `?` convert
/// repo and infrastructure failures into the right HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side faults get logged with an id the client can quote back;
        // the underlying error text stays out of the response.
        let message = match &self {
            AppError::Database(e) => {
                let error_id = Uuid::new_v4();
                error!(%error_id, error = %e, "database error");
                format!("Internal server error (id {error_id})")
            }
            AppError::Internal(e) => {
                let error_id = Uuid::new_v4();
                error!(%error_id, error = %e, "internal error");
                format!("Internal server error (id {error_id})")
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            },
            "status": status.as_u16(),
            "timestamp": OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        });

        (status, Json(body)).into_response()
    }
}

pub trait OptionExt<T> {
    fn ok_or_not_found(self, what: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, what: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{what} not found")))
    }
}
