//! Contact handlers.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::{ApiError, AuthUser, Listing, PageParams};
use crate::{
    context::AppContext,
    domain::aggregates::{Contact, ContactData},
    services::PageRequest,
};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ContactRequest {
    /// Owner; admins may add contacts for other users.
    pub user: Option<i64>,
    #[validate(length(min = 1, max = 50, message = "Длина поля должна быть от 1 до 50 символов."))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "Длина поля должна быть от 1 до 100 символов."))]
    pub street: String,
    #[serde(default)]
    #[validate(length(max = 15, message = "Убедитесь, что это значение содержит не более 15 символов."))]
    pub house: String,
    #[serde(default)]
    #[validate(length(max = 15, message = "Убедитесь, что это значение содержит не более 15 символов."))]
    pub structure: String,
    #[serde(default)]
    #[validate(length(max = 15, message = "Убедитесь, что это значение содержит не более 15 символов."))]
    pub building: String,
    #[serde(default)]
    #[validate(length(max = 15, message = "Убедитесь, что это значение содержит не более 15 символов."))]
    pub apartment: String,
    #[serde(default)]
    #[validate(length(max = 20, message = "Убедитесь, что это значение содержит не более 20 символов."))]
    pub phone: String,
}

impl ContactRequest {
    fn into_data(self) -> ContactData {
        ContactData {
            city: self.city,
            street: self.street,
            house: self.house,
            structure: self.structure,
            building: self.building,
            apartment: self.apartment,
            phone: self.phone,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ContactFilters {
    pub user: Option<i64>,
}

pub(crate) async fn list_contacts(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(filters): Query<ContactFilters>,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Contact>>, ApiError> {
    let page = PageRequest::from(params);

    let contacts = app.contacts.list_contacts(user.actor(), filters.user, page).await?;

    Ok(Json(Listing::new(contacts, page, &uri)))
}

/// Contacts of one user: the requester's own, or anyone's for admins.
pub(crate) async fn list_user_contacts(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(owner): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Contact>>, ApiError> {
    let page = PageRequest::from(params);

    let contacts = app.contacts.list_contacts(user.actor(), Some(owner), page).await?;

    Ok(Json(Listing::new(contacts, page, &uri)))
}

pub(crate) async fn get_contact(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError> {
    Ok(Json(app.contacts.get_contact(user.actor(), id).await?))
}

pub(crate) async fn create_contact(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<ContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    request.validate()?;

    let owner = request.user;
    let contact = app.contacts.create_contact(user.actor(), owner, request.into_data()).await?;

    Ok((StatusCode::CREATED, Json(contact)))
}

pub(crate) async fn update_contact(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<ContactRequest>,
) -> Result<Json<Contact>, ApiError> {
    request.validate()?;

    Ok(Json(app.contacts.update_contact(user.actor(), id, request.into_data()).await?))
}

pub(crate) async fn delete_contact(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app.contacts.delete_contact(user.actor(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{
        domain::aggregates::{ContactError, UserRole},
        http::test_helpers::{make_user, request, send, TestApp},
        services::{Page, ServiceError},
    };

    fn make_contact(id: i64, user_id: i64) -> Contact {
        Contact {
            id,
            user_id,
            city: "Москва".into(),
            street: "Тверская".into(),
            house: "1".into(),
            structure: String::new(),
            building: String::new(),
            apartment: "12".into(),
            phone: "+79991234567".into(),
        }
    }

    #[tokio::test]
    async fn sixth_contact_is_rejected() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.contacts
            .expect_create_contact()
            .once()
            .withf(|actor, owner, data| actor.id == 1 && owner.is_none() && data.city == "Москва")
            .return_once(|_, _, _| Err(ServiceError::Contact(ContactError::LimitReached)));

        let body = json!({ "city": "Москва", "street": "Тверская", "phone": "+79991234567" });
        let (status, body) = send(app.router(), request(Method::POST, "/api/contacts", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "Максимум 5 адресов на пользователя." }));

        Ok(())
    }

    #[tokio::test]
    async fn blank_city_never_reaches_the_service() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.contacts.expect_create_contact().never();

        let body = json!({ "city": "", "street": "Тверская" });
        let (status, body) = send(app.router(), request(Method::POST, "/api/contacts", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("city").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn user_contacts_pass_the_owner() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.contacts
            .expect_list_contacts()
            .once()
            .withf(|actor, owner, page| actor.id == 1 && *owner == Some(1) && !page.is_paginated())
            .return_once(|_, _, _| Ok(Page { items: vec![make_contact(5, 1)], total: None }));

        let (status, body) = send(app.router(), request(Method::GET, "/api/users/1/contacts", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["user"], 1);
        assert_eq!(body[0]["city"], "Москва");

        Ok(())
    }

    #[tokio::test]
    async fn foreign_contact_returns_404() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.contacts.expect_delete_contact().once().return_once(|_, _| Err(ServiceError::NotFound));

        let (status, _) = send(app.router(), request(Method::DELETE, "/api/contacts/7", None)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }
}
