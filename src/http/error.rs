//! Errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::services::{FieldErrors, ServiceError, NOT_ALLOWED};

#[derive(Debug)]
pub enum ApiError {
    /// Missing or unusable credentials.
    Unauthenticated,
    /// Authenticated, but the role may not use the endpoint.
    Forbidden,
    /// Request body or query failed validation.
    Validation(FieldErrors),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self { Self::Service(error) }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self { Self::Validation(errors.into()) }
}

fn detail_body(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "detail": message.to_string() }))).into_response()
}

fn error_body(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => detail_body(StatusCode::UNAUTHORIZED, ServiceError::Unauthenticated),
            Self::Forbidden => detail_body(StatusCode::FORBIDDEN, NOT_ALLOWED),
            Self::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            Self::Service(error) => service_error(error),
        }
    }
}

fn service_error(e: ServiceError) -> Response {
    match e {
        ServiceError::NotFound | ServiceError::UserNotFound => detail_body(StatusCode::NOT_FOUND, e),
        ServiceError::AlreadyExists
        | ServiceError::InvalidReference
        | ServiceError::InvalidData
        | ServiceError::Order(_)
        | ServiceError::Contact(_)
        | ServiceError::CatalogFile(_)
        | ServiceError::Rejected(_) => detail_body(StatusCode::BAD_REQUEST, e),
        ServiceError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
        ServiceError::Forbidden(message) => error_body(StatusCode::FORBIDDEN, message),
        ServiceError::Upload(message) => error_body(StatusCode::BAD_REQUEST, message),
        ServiceError::Unauthenticated => detail_body(StatusCode::UNAUTHORIZED, e),
        ServiceError::Auth(_) | ServiceError::Task(_) | ServiceError::Sql(_) | ServiceError::Io(_) => {
            error!(error = ?e, "request failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderError;
    use axum::body::to_bytes;
    use serde_json::Value;
    use testresult::TestResult;

    async fn render(error: ApiError) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn order_errors_are_bad_requests() -> TestResult {
        let (status, body) = render(ServiceError::from(OrderError::EmptyBasket).into()).await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "Корзина пуста." }));

        Ok(())
    }

    #[tokio::test]
    async fn missing_user_is_not_found() -> TestResult {
        let (status, body) = render(ServiceError::UserNotFound.into()).await?;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Пользователь не найден." }));

        Ok(())
    }

    #[tokio::test]
    async fn field_errors_render_as_a_map() -> TestResult {
        let (status, body) = render(ServiceError::field("email", "bad").into()).await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "email": ["bad"] }));

        Ok(())
    }

    #[tokio::test]
    async fn unexpected_failures_pass_the_message_through() -> TestResult {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let (status, body) = render(ServiceError::Io(io).into()).await?;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().is_some_and(|message| message.contains("disk full")), "{body}");

        Ok(())
    }

    #[tokio::test]
    async fn role_failures_are_forbidden() -> TestResult {
        let (status, body) = render(ApiError::Forbidden).await?;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "detail": NOT_ALLOWED }));

        Ok(())
    }
}
