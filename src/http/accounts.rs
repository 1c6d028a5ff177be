//! Account handlers: registration, login, password reset and user administration.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::{ApiError, AuthUser, Listing, PageParams};
use crate::{
    context::AppContext,
    domain::aggregates::{User, UserRole},
    services::{LoginSession, PageRequest, Registration, UserUpdate},
};

const STAFF: &[UserRole] = &[UserRole::Supplier, UserRole::Admin];

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self { id: user.id, email: user.email, first_name: user.first_name, last_name: user.last_name, role: user.role }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Убедитесь, что это значение содержит не более 150 символов."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Убедитесь, что это значение содержит не более 150 символов."))]
    pub last_name: String,
    pub role: Option<String>,
}

pub(crate) async fn register(
    State(app): State<AppContext>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    request.validate()?;

    app.accounts
        .register(Registration {
            email: request.email,
            password: request.password,
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "Status": "success",
            "Message": "Пользователь успешно создан. Пожалуйста, проверьте вашу почту для подтверждения регистрации.",
        })),
    ))
}

pub(crate) async fn confirm_registration(
    State(app): State<AppContext>,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    app.accounts.confirm_registration(token).await?;

    Ok(Json(json!({ "Status": "success", "Message": "Ваш аккаунт успешно активирован." })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub(crate) async fn login(
    State(app): State<AppContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginSession>, ApiError> {
    Ok(Json(app.accounts.login(request.email, request.password).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshRequest {
    pub refresh_token: String,
}

pub(crate) async fn refresh(
    State(app): State<AppContext>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let access_token = app.accounts.refresh(request.refresh_token).await?;

    Ok(Json(json!({ "access_token": access_token })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResetRequest {
    pub email: String,
}

pub(crate) async fn request_password_reset(
    State(app): State<AppContext>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<Value>, ApiError> {
    app.accounts.request_password_reset(request.email).await?;

    Ok(Json(json!({ "detail": "Ссылка для сброса пароля отправлена на email." })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewPasswordRequest {
    pub new_password: String,
}

pub(crate) async fn confirm_password_reset(
    State(app): State<AppContext>,
    Path((uidb64, token)): Path<(String, String)>,
    Json(request): Json<NewPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    app.accounts.confirm_password_reset(uidb64, token, request.new_password).await?;

    Ok(Json(json!({ "detail": "Пароль успешно изменён." })))
}

pub(crate) async fn list_users(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<UserResponse>>, ApiError> {
    user.require(STAFF)?;
    let page = PageRequest::from(params);

    let users = app.accounts.list_users(page).await?;

    Ok(Json(Listing::new(users.map(UserResponse::from), page, &uri)))
}

pub(crate) async fn get_user(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.accounts.get_user(id).await?.into()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
}

pub(crate) async fn update_user(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    user.require(STAFF)?;

    let update = UserUpdate {
        email: request.email,
        first_name: request.first_name,
        last_name: request.last_name,
        role: request.role,
    };

    Ok(Json(app.accounts.update_user(id, update).await?.into()))
}

pub(crate) async fn delete_user(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(STAFF)?;

    app.accounts.delete_user(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn toggle_activity(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let actor = user.require(&[UserRole::Admin])?;

    let target = app.accounts.toggle_activity(actor, id).await?;

    Ok(Json(json!({
        "message": format!(
            "Активность пользователя {} (ID={}) изменена на {}",
            target.email,
            target.id,
            if target.is_active { "True" } else { "False" }
        ),
        "user_id": target.id,
        "new_status": target.is_active,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use testresult::TestResult;

    use super::*;
    use crate::{
        http::test_helpers::{anonymous, make_user, request, send, TestApp},
        services::{Page, ServiceError},
    };

    #[tokio::test]
    async fn register_returns_201() -> TestResult {
        let mut app = TestApp::default();
        app.accounts
            .expect_register()
            .once()
            .withf(|registration| registration.email == "new@example.com" && registration.role.is_none())
            .return_once(|_| Ok(make_user(3, UserRole::Customer)));

        let body = json!({ "email": "new@example.com", "password": "Str0ngPass!" });
        let (status, body) = send(app.router(), anonymous(Method::POST, "/api/auth/register", Some(body))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["Status"], "success");

        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_long_names_before_the_service() -> TestResult {
        let mut app = TestApp::default();
        app.accounts.expect_register().never();

        let body = json!({ "email": "new@example.com", "password": "Str0ngPass!", "first_name": "x".repeat(151) });
        let (status, body) = send(app.router(), anonymous(Method::POST, "/api/auth/register", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("first_name").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn login_failure_returns_non_field_errors() -> TestResult {
        let mut app = TestApp::default();
        app.accounts
            .expect_login()
            .once()
            .return_once(|_, _| Err(ServiceError::field("non_field_errors", "Неверные данные.")));

        let body = json!({ "email": "a@example.com", "password": "wrong" });
        let (status, body) = send(app.router(), anonymous(Method::POST, "/api/auth/login", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "non_field_errors": ["Неверные данные."] }));

        Ok(())
    }

    #[tokio::test]
    async fn reset_confirm_with_unknown_user_returns_404() -> TestResult {
        let mut app = TestApp::default();
        app.accounts
            .expect_confirm_password_reset()
            .once()
            .withf(|uid, token, password| uid == "OTk" && token == "abc" && password == "N3wPassword")
            .return_once(|_, _, _| Err(ServiceError::UserNotFound));

        let body = json!({ "new_password": "N3wPassword" });
        let uri = "/api/auth/password/reset/confirm/OTk/abc";
        let (status, body) = send(app.router(), anonymous(Method::POST, uri, Some(body))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Пользователь не найден." }));

        Ok(())
    }

    #[tokio::test]
    async fn users_require_a_token() -> TestResult {
        let mut app = TestApp::default();
        app.accounts.expect_list_users().never();

        let (status, body) = send(app.router(), anonymous(Method::GET, "/api/users", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Вы не авторизованы. Пожалуйста, войдите в систему.");

        Ok(())
    }

    #[tokio::test]
    async fn customers_cannot_list_users() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.accounts.expect_list_users().never();

        let (status, _) = send(app.router(), request(Method::GET, "/api/users", None)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);

        Ok(())
    }

    #[tokio::test]
    async fn users_are_paginated_with_limit() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Admin));
        app.accounts
            .expect_list_users()
            .once()
            .withf(|page| *page == PageRequest { limit: Some(1), offset: 0 })
            .return_once(|_| Ok(Page { items: vec![make_user(1, UserRole::Admin)], total: Some(2) }));

        let (status, body) = send(app.router(), request(Method::GET, "/api/users?limit=1", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["next"], "/api/users?limit=1&offset=1");
        assert_eq!(body["results"][0]["email"], "user1@example.com");

        Ok(())
    }

    #[tokio::test]
    async fn toggle_own_account_is_forbidden() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Admin));
        app.accounts
            .expect_toggle_activity()
            .once()
            .withf(|actor, id| actor.id == 1 && *id == 1)
            .return_once(|_, _| {
                Err(ServiceError::Forbidden("Вы не можете изменить активность своего аккаунта.".to_string()))
            });

        let (status, body) = send(app.router(), request(Method::POST, "/api/user/1/toggle-activity", None)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "Вы не можете изменить активность своего аккаунта." }));

        Ok(())
    }

    #[tokio::test]
    async fn toggle_reports_the_new_status() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Admin));
        app.accounts.expect_toggle_activity().once().return_once(|_, _| {
            let mut target = make_user(4, UserRole::Supplier);
            target.is_active = false;
            Ok(target)
        });

        let (status, body) = send(app.router(), request(Method::POST, "/api/user/4/toggle-activity", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Активность пользователя user4@example.com (ID=4) изменена на False");
        assert_eq!(body["new_status"], false);

        Ok(())
    }
}
