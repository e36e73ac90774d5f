use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error returned by every handler. Rendered as `{"error": .., "code": ..}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Failed to deliver email")]
    Delivery {
        operator_notified: bool,
        confirmation_sent: bool,
    },

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateSlug(_) => StatusCode::CONFLICT,
            AppError::Delivery { .. } => StatusCode::BAD_GATEWAY,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateSlug(_) => "DUPLICATE_SLUG",
            AppError::Delivery { .. } => "DELIVERY_FAILED",
            AppError::Upstream(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(format!("Invalid multipart body: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Upstream(e) => {
                tracing::error!(error = ?e, "request failed");
                // Detail is added back by `expose_upstream_detail` in development.
                json!({ "error": "Internal Server Error", "code": self.code() })
            }
            AppError::Delivery {
                operator_notified,
                confirmation_sent,
            } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "operatorNotified": operator_notified,
                "confirmationSent": confirmation_sent,
            }),
            _ => json!({ "error": self.to_string(), "code": self.code() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::Upstream(e) = &self {
            response.extensions_mut().insert(UpstreamDetail(format!("{e:#}")));
        }
        response
    }
}

/// Full upstream error chain, carried on the response for the development-only
/// detail layer in `app.rs`.
#[derive(Debug, Clone)]
pub struct UpstreamDetail(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateSlug("hi".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Upstream(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn upstream_body_hides_detail() {
        let response = AppError::Upstream(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("INTERNAL_ERROR"));
    }
}
