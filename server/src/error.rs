use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::derive::Display;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Display)]
pub enum AppError {
    /// Remote mailbox rejected the bearer token; the caller must
    /// re-authenticate.
    AuthExpired,
    /// Remote mailbox denied the requested scope.
    AccessDenied,
    /// Remote throttling; the caller should back off and may retry.
    RateLimited,
    /// Any other remote mailbox error. Details go to the log, never the user.
    Mailbox(anyhow::Error),
    /// The remote API rejected an outbound send. Sending is an explicit
    /// user-requested side effect, so the upstream reason is surfaced.
    SendFailure(String),
    /// Generative backend unusable at construction time.
    Configuration(String),
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        match error.status() {
            Some(StatusCode::UNAUTHORIZED) => AppError::AuthExpired,
            Some(StatusCode::FORBIDDEN) => AppError::AccessDenied,
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::RateLimited,
            _ => AppError::Mailbox(error.into()),
        }
    }
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::AuthExpired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {
                    "code": StatusCode::UNAUTHORIZED.as_u16(),
                    "message": "Gmail authentication expired. Please reconnect your account."
                }})),
            ),
            AppError::AccessDenied => (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {
                    "code": StatusCode::FORBIDDEN.as_u16(),
                    "message": "Gmail access denied. Please check your permissions."
                }})),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {
                    "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "message": "Rate limit exceeded. Please try again in a moment."
                }})),
            ),
            AppError::Mailbox(e) => {
                tracing::error!("Mailbox error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": {
                        "code": StatusCode::BAD_GATEWAY.as_u16(),
                        "message": "Mailbox request failed. Please try again."
                    }})),
                )
            }
            AppError::SendFailure(reason) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": {
                    "code": StatusCode::BAD_GATEWAY.as_u16(),
                    "message": format!("Failed to send email: {}", reason)
                }})),
            ),
            AppError::Configuration(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": {
                        "code": StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                        "message": "AI service is not properly configured. Please contact support."
                    }})),
                )
            }
            AppError::Unauthorized(error) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {
                    "code": StatusCode::UNAUTHORIZED.as_u16(),
                    "message": error
                }})),
            ),
            AppError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {
                    "code": StatusCode::BAD_REQUEST.as_u16(),
                    "message": error
                }})),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {
                    "code": StatusCode::NOT_FOUND.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": "Internal server error"
                    }})),
                )
            }
        };
        tracing::error!("Error: {:?}", err.1);

        err.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_becomes_internal() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_reason() {
        let resp = AppError::SendFailure("Invalid To header".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"]["message"],
            "Failed to send email: Invalid To header"
        );
    }

    #[tokio::test]
    async fn test_mailbox_error_hides_upstream_text() {
        let resp = AppError::Mailbox(anyhow::anyhow!("secret upstream detail")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret upstream detail"));
    }
}
