//! Basket and order handlers.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::{ApiError, AuthUser, Listing, PageParams};
use crate::{
    context::AppContext,
    domain::aggregates::{BasketLine, Order, OrderItem, OrderStatus, UserRole},
    services::{PageRequest, ServiceError},
};

const CUSTOMERS: &[UserRole] = &[UserRole::Customer, UserRole::Admin];
const STAFF: &[UserRole] = &[UserRole::Supplier, UserRole::Admin];

#[derive(Debug, Serialize)]
pub(crate) struct OrderResponse {
    pub id: i64,
    pub user: i64,
    pub contact: Option<i64>,
    pub order_items: Vec<OrderItemResponse>,
    pub dt: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_cost: Decimal,
}

#[derive(Debug, Serialize)]
pub(crate) struct OrderItemResponse {
    pub id: Option<i64>,
    pub product: i64,
    pub shop: i64,
    pub quantity: i32,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self { id: item.id, product: item.product_id, shop: item.shop_id, quantity: item.quantity }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id(),
            user: order.user_id(),
            contact: order.contact_id(),
            order_items: order.items().iter().map(OrderItemResponse::from).collect(),
            dt: order.dt(),
            status: order.status(),
            total_cost: order.total_cost(),
        }
    }
}

fn responses(orders: Vec<Order>) -> Vec<OrderResponse> { orders.into_iter().map(OrderResponse::from).collect() }

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct LineRequest {
    pub product: i64,
    pub shop: i64,
    pub quantity: i32,
}

impl From<LineRequest> for BasketLine {
    fn from(line: LineRequest) -> Self { Self { product_id: line.product, shop_id: line.shop, quantity: line.quantity } }
}

fn lines(items: Vec<LineRequest>) -> Vec<BasketLine> { items.into_iter().map(BasketLine::from).collect() }

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BasketRequest {
    #[validate(length(min = 1, message = "Список товаров не может быть пустым."))]
    pub order_items: Vec<LineRequest>,
}

pub(crate) async fn list_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<OrderResponse>>, ApiError> {
    let actor = user.require(CUSTOMERS)?;
    let page = PageRequest::from(params);

    let orders = app.orders.list_basket(actor, page).await?;

    Ok(Json(Listing::new(orders.map(OrderResponse::from), page, &uri)))
}

pub(crate) async fn get_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = user.require(CUSTOMERS)?;

    Ok(Json(app.orders.get_basket(actor, id).await?.into()))
}

pub(crate) async fn add_to_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<BasketRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let actor = user.require(CUSTOMERS)?;
    request.validate()?;

    let basket = app.orders.add_to_basket(actor, lines(request.order_items)).await?;

    Ok((StatusCode::CREATED, Json(basket.into())))
}

pub(crate) async fn update_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<BasketRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = user.require(CUSTOMERS)?;
    request.validate()?;

    Ok(Json(app.orders.update_basket(actor, id, lines(request.order_items)).await?.into()))
}

pub(crate) async fn delete_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = user.require(CUSTOMERS)?;

    app.orders.delete_basket(actor, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfirmRequest {
    pub contact_id: Option<i64>,
}

/// Confirms the basket for the contact named in the body, if any.
pub(crate) async fn confirm_basket(
    State(app): State<AppContext>,
    user: AuthUser,
    request: Option<Json<ConfirmRequest>>,
) -> Result<Json<Value>, ApiError> {
    let contact_id = request.and_then(|Json(request)| request.contact_id);
    confirm(&app, &user, contact_id).await
}

pub(crate) async fn confirm_basket_with_contact(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(contact_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    confirm(&app, &user, Some(contact_id)).await
}

async fn confirm(app: &AppContext, user: &AuthUser, contact_id: Option<i64>) -> Result<Json<Value>, ApiError> {
    let actor = user.require(CUSTOMERS)?;

    app.orders.confirm_basket(actor, contact_id).await?;

    Ok(Json(json!({ "detail": "Заказ успешно подтвержден." })))
}

pub(crate) async fn user_orders(
    State(app): State<AppContext>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let actor = user.require(CUSTOMERS)?;

    Ok(Json(responses(app.orders.user_orders(actor).await?)))
}

pub(crate) async fn partner_orders(
    State(app): State<AppContext>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let actor = user.require(STAFF)?;

    Ok(Json(responses(app.orders.partner_orders(actor).await?)))
}

pub(crate) async fn list_orders(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<OrderResponse>>, ApiError> {
    user.require(STAFF)?;
    let page = PageRequest::from(params);

    let orders = app.orders.list_orders(page).await?;

    Ok(Json(Listing::new(orders.map(OrderResponse::from), page, &uri)))
}

pub(crate) async fn get_order(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.orders.get_order(id).await?.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateOrderRequest {
    pub user: i64,
    #[validate(length(min = 1, message = "Список товаров не может быть пустым."))]
    pub order_items: Vec<LineRequest>,
}

pub(crate) async fn create_order(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    user.require(STAFF)?;
    request.validate()?;

    let order = app.orders.create_order(request.user, lines(request.order_items)).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateOrderRequest {
    pub order_items: Option<Vec<LineRequest>>,
    pub status: Option<String>,
}

pub(crate) async fn update_order(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    user.require(STAFF)?;

    let status = request.status.as_deref().map(str::parse::<OrderStatus>).transpose().map_err(ServiceError::from)?;
    let order = app.orders.update_order(id, request.order_items.map(lines), status).await?;

    Ok(Json(order.into()))
}

pub(crate) async fn delete_order(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(STAFF)?;

    app.orders.delete_order(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use testresult::TestResult;

    use super::*;
    use crate::{
        domain::aggregates::OrderError,
        http::test_helpers::{make_user, request, send, TestApp},
    };

    fn make_order(id: i64, user_id: i64, status: OrderStatus) -> Order {
        let item = OrderItem {
            id: Some(1),
            product_id: 10,
            shop_id: 3,
            quantity: 2,
            unit_price: Some(Decimal::new(1500, 2)),
            shop_owner_id: Some(7),
        };
        Order::restore(id, user_id, Some(5), Utc::now(), status, vec![item])
    }

    #[tokio::test]
    async fn confirm_returns_success_message() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.orders
            .expect_confirm_basket()
            .once()
            .withf(|actor, contact| actor.id == 1 && *contact == Some(5))
            .return_once(|_, _| Ok(make_order(8, 1, OrderStatus::Confirmed)));

        let body = json!({ "contact_id": 5 });
        let (status, body) = send(app.router(), request(Method::POST, "/api/basket/confirm", Some(body))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "detail": "Заказ успешно подтвержден." }));

        Ok(())
    }

    #[tokio::test]
    async fn confirm_takes_the_contact_from_the_path() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.orders
            .expect_confirm_basket()
            .once()
            .withf(|_, contact| *contact == Some(6))
            .return_once(|_, _| Ok(make_order(8, 1, OrderStatus::Confirmed)));

        let (status, _) = send(app.router(), request(Method::POST, "/api/basket/confirm/6", None)).await;

        assert_eq!(status, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn confirm_without_contact_is_a_bad_request() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.orders
            .expect_confirm_basket()
            .once()
            .withf(|_, contact| contact.is_none())
            .return_once(|_, _| Err(OrderError::ContactRequired.into()));

        let (status, body) = send(app.router(), request(Method::POST, "/api/basket/confirm", None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "ID контакта обязателен." }));

        Ok(())
    }

    #[tokio::test]
    async fn suppliers_have_no_basket() -> TestResult {
        let mut app = TestApp::signed_in(make_user(2, UserRole::Supplier));
        app.orders.expect_confirm_basket().never();

        let (status, _) = send(app.router(), request(Method::POST, "/api/basket/confirm/6", None)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);

        Ok(())
    }

    #[tokio::test]
    async fn basket_edit_needs_items() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.orders.expect_update_basket().never();

        let body = json!({ "order_items": [] });
        let (status, body) = send(app.router(), request(Method::PUT, "/api/basket/8", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "order_items": ["Список товаров не может быть пустым."] }));

        Ok(())
    }

    #[tokio::test]
    async fn basket_lines_are_forwarded() -> TestResult {
        let mut app = TestApp::signed_in(make_user(1, UserRole::Customer));
        app.orders
            .expect_add_to_basket()
            .once()
            .withf(|_, lines| lines == &[BasketLine { product_id: 10, shop_id: 3, quantity: 2 }])
            .return_once(|_, _| Ok(make_order(8, 1, OrderStatus::New)));

        let body = json!({ "order_items": [{ "product": 10, "shop": 3, "quantity": 2 }] });
        let (status, body) = send(app.router(), request(Method::POST, "/api/basket", Some(body))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "new");
        assert_eq!(body["order_items"][0], json!({ "id": 1, "product": 10, "shop": 3, "quantity": 2 }));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_status_is_rejected_before_the_service() -> TestResult {
        let mut app = TestApp::signed_in(make_user(9, UserRole::Admin));
        app.orders.expect_update_order().never();

        let body = json!({ "status": "lost" });
        let (status, body) = send(app.router(), request(Method::PATCH, "/api/orders/8", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap_or_default().starts_with("Некорректный статус: lost."));

        Ok(())
    }

    #[tokio::test]
    async fn status_updates_reach_the_service() -> TestResult {
        let mut app = TestApp::signed_in(make_user(9, UserRole::Admin));
        app.orders
            .expect_update_order()
            .once()
            .withf(|id, lines, status| *id == 8 && lines.is_none() && *status == Some(OrderStatus::Assembled))
            .return_once(|_, _, _| Ok(make_order(8, 1, OrderStatus::Assembled)));

        let body = json!({ "status": "assembled" });
        let (status, body) = send(app.router(), request(Method::PATCH, "/api/orders/8", Some(body))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "assembled");

        Ok(())
    }

    #[tokio::test]
    async fn partner_without_shop_is_rejected() -> TestResult {
        let mut app = TestApp::signed_in(make_user(2, UserRole::Supplier));
        app.orders
            .expect_partner_orders()
            .once()
            .return_once(|_| Err(ServiceError::Rejected("Вы не связаны с магазином.".to_string())));

        let (status, body) = send(app.router(), request(Method::GET, "/api/partner/orders", None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "Вы не связаны с магазином." }));

        Ok(())
    }
}
