//! HTTP API
//!
//! JSON endpoints over the application services. Paths and response bodies
//! follow the public API of the marketplace; handlers only translate between
//! HTTP and service calls.

mod accounts;
mod catalog;
mod contacts;
mod error;
mod extract;
mod orders;
mod pagination;
mod partners;
#[cfg(test)]
mod test_helpers;

pub use error::ApiError;
pub use extract::AuthUser;
pub use pagination::{Listing, PageParams};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::context::AppContext;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(app: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "marketplace" }))
}

fn api() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(accounts::register))
        .route("/auth/register/confirm/:token", get(accounts::confirm_registration))
        .route("/auth/login", post(accounts::login))
        .route("/auth/token/refresh", post(accounts::refresh))
        .route("/auth/password/reset", post(accounts::request_password_reset))
        .route("/auth/password/reset/confirm/:uidb64/:token", post(accounts::confirm_password_reset))
        .route("/users", get(accounts::list_users))
        .route(
            "/users/:id",
            get(accounts::get_user).put(accounts::update_user).patch(accounts::update_user).delete(accounts::delete_user),
        )
        .route("/users/:id/contacts", get(contacts::list_user_contacts))
        .route("/user/:id/toggle-activity", post(accounts::toggle_activity))
        .route("/user/orders", get(orders::user_orders))
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:id",
            get(catalog::get_product)
                .put(catalog::update_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category)
                .put(catalog::update_category)
                .patch(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route("/parameters", get(catalog::list_parameters).post(catalog::create_parameter))
        .route(
            "/parameters/:id",
            get(catalog::get_parameter)
                .put(catalog::update_parameter)
                .patch(catalog::update_parameter)
                .delete(catalog::delete_parameter),
        )
        .route("/shops", get(catalog::list_shops).post(catalog::create_shop))
        .route("/contacts", get(contacts::list_contacts).post(contacts::create_contact))
        .route(
            "/contacts/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .patch(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/basket", get(orders::list_basket).post(orders::add_to_basket))
        .route("/basket/confirm", post(orders::confirm_basket))
        .route("/basket/confirm/:contact_id", post(orders::confirm_basket_with_contact))
        .route(
            "/basket/:id",
            get(orders::get_basket)
                .put(orders::update_basket)
                .patch(orders::update_basket)
                .delete(orders::delete_basket),
        )
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:id",
            get(orders::get_order).put(orders::update_order).patch(orders::update_order).delete(orders::delete_order),
        )
        .route(
            "/partner/update",
            post(partners::upload_catalog).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/partner/import", get(partners::request_export))
        .route("/partner/import/status/:task_id", get(partners::task_status))
        .route("/partner/orders", get(orders::partner_orders))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::test_helpers::{anonymous, send, TestApp};

    #[tokio::test]
    async fn health_needs_no_token() {
        let (status, body) = send(TestApp::default().router(), anonymous(Method::GET, "/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy", "service": "marketplace" }));
    }
}
