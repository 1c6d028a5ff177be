//! Test helpers.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    context::AppContext,
    domain::aggregates::{User, UserRole},
    services::{MockAccountsService, MockCatalogService, MockContactsService, MockOrdersService, MockPartnersService},
};

pub(crate) const TOKEN: &str = "test-access-token";

pub(crate) fn make_user(id: i64, role: UserRole) -> User {
    User {
        id,
        email: format!("user{id}@example.com"),
        password_hash: String::new(),
        first_name: "Иван".into(),
        last_name: "Петров".into(),
        role,
        is_active: true,
        is_staff: role == UserRole::Admin,
        confirmation_token: None,
        password_reset_token: None,
        password_reset_expires_at: None,
        last_login: None,
        date_joined: Utc::now(),
    }
}

/// Mock services behind a router. Unset expectations fail the test.
#[derive(Default)]
pub(crate) struct TestApp {
    pub accounts: MockAccountsService,
    pub catalog: MockCatalogService,
    pub contacts: MockContactsService,
    pub orders: MockOrdersService,
    pub partners: MockPartnersService,
}

impl TestApp {
    /// An app where [`TOKEN`] authenticates as `user`.
    pub(crate) fn signed_in(user: User) -> Self {
        let mut app = Self::default();
        app.accounts.expect_authenticate().withf(|token| token == TOKEN).returning(move |_| Ok(user.clone()));
        app
    }

    pub(crate) fn router(self) -> Router {
        super::router(AppContext {
            accounts: Arc::new(self.accounts),
            catalog: Arc::new(self.catalog),
            contacts: Arc::new(self.contacts),
            orders: Arc::new(self.orders),
            partners: Arc::new(self.partners),
        })
    }
}

pub(crate) fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri).header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) fn anonymous(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let mut request = request(method, uri, body);
    request.headers_mut().remove(header::AUTHORIZATION);
    request
}

/// Sends `request` and decodes the JSON body, `Value::Null` when empty.
pub(crate) async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, json)
}
