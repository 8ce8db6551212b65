use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("Too many requests. Please try again later.")]
    TooManyRequests { retry_after: u64 },

    #[error("database error: {0}")]
    Database(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::TooManyRequests { .. } => 429,
            _ => 500,
        }
    }

    /// Message safe to show to clients. Backend failures are not echoed.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Cache(_) | AppError::Config(_) | AppError::StartServer(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if AppError::status_code(self) >= 500 {
            tracing::error!(error = %self, "request failed");
        }

        let mut builder = HttpResponse::build(ResponseError::status_code(self));
        let data = match self {
            AppError::Unauthorized => {
                builder.insert_header(("WWW-Authenticate", "Bearer"));
                json!({})
            }
            AppError::TooManyRequests { retry_after } => {
                builder.insert_header(("Retry-After", retry_after.to_string()));
                json!({ "retry_after": retry_after })
            }
            _ => json!({}),
        };

        builder.json(json!({
            "success": false,
            "message": self.public_message(),
            "data": data
        }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Cache(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(error = %e, "token rejected");
        AppError::Unauthorized
    }
}

impl From<crate::websocket::NotificationError> for AppError {
    fn from(e: crate::websocket::NotificationError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AppError::Database("x".into()).status_code(), 500);
    }

    #[actix_web::test]
    async fn test_forbidden_renders_envelope() {
        let err = AppError::Forbidden("Permission 'loan:approve' denied for role 'teller'".into());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "Permission 'loan:approve' denied for role 'teller'");
    }

    #[actix_web::test]
    async fn test_too_many_requests_carries_retry_after() {
        let resp = AppError::TooManyRequests { retry_after: 42 }.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("Retry-After").unwrap(), "42");

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["data"]["retry_after"], 42);
    }

    #[actix_web::test]
    async fn test_database_error_is_not_leaked() {
        let resp = AppError::Database("relation \"roles\" does not exist".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Internal server error");
    }
}
