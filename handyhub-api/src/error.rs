use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use handyhub_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnavailableError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnavailableError(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::AuthenticationError(msg) => AppError::AuthenticationError(msg),
            CoreError::PermissionError(msg) => AppError::AuthorizationError(msg),
            CoreError::ConflictError(msg) => AppError::ConflictError(msg),
            CoreError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            err @ CoreError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
            CoreError::LookupError(msg) => AppError::UnavailableError(format!("lookup failed: {}", msg)),
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let cases = [
            (CoreError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::AuthenticationError("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::PermissionError("x".into()), StatusCode::FORBIDDEN),
            (CoreError::NotFound("booking 1".into()), StatusCode::NOT_FOUND),
            (CoreError::ConflictError("x".into()), StatusCode::CONFLICT),
            (
                CoreError::InvalidTransition {
                    from: "rejected".into(),
                    to: "accepted".into(),
                },
                StatusCode::CONFLICT,
            ),
            (CoreError::LookupError("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
