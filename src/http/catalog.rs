//! Catalog handlers: products, categories, parameters and shops.

use std::collections::BTreeMap;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, AuthUser, Listing, PageParams};
use crate::{
    context::AppContext,
    domain::{
        aggregates::{
            Category, NewShop, Parameter, Product, ProductDraft, ProductInfo, ProductInfoDraft, ProductPatch,
            ProductQuery, Shop, UserRole,
        },
        value_objects::Price,
    },
    services::{FieldErrors, PageRequest},
};

const STAFF: &[UserRole] = &[UserRole::Supplier, UserRole::Admin];
const ADMIN: &[UserRole] = &[UserRole::Admin];

#[derive(Debug, Serialize)]
pub(crate) struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub category: Category,
    pub product_infos: Vec<ProductInfoResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProductInfoResponse {
    pub id: i64,
    pub shop: i64,
    pub external_id: Option<String>,
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub price_rrc: Decimal,
    pub parameters: BTreeMap<String, String>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            model: product.model,
            category: product.category,
            product_infos: product.product_infos.into_iter().map(ProductInfoResponse::from).collect(),
        }
    }
}

impl From<ProductInfo> for ProductInfoResponse {
    fn from(info: ProductInfo) -> Self {
        Self {
            id: info.id,
            shop: info.shop_id,
            external_id: info.external_id,
            description: info.description,
            quantity: info.quantity,
            price: info.price,
            price_rrc: info.price_rrc,
            parameters: info.parameters,
        }
    }
}

/// A category given either as `{"name": ..}` or as a bare name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CategoryField {
    Named { name: String },
    Name(String),
}

impl CategoryField {
    fn into_name(self) -> String {
        match self {
            Self::Named { name } | Self::Name(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParameterValue {
    pub parameter: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductInfoRequest {
    pub id: Option<i64>,
    pub shop: i64,
    pub external_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: i32,
    pub price: Decimal,
    pub price_rrc: Decimal,
    #[serde(default)]
    pub parameters: Vec<ParameterValue>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ProductRequest {
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "Убедитесь, что это значение содержит не более 255 символов."))]
    pub model: String,
    pub category: CategoryField,
    #[serde(default)]
    pub product_infos: Vec<ProductInfoRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ProductPatchRequest {
    pub name: Option<String>,
    #[validate(length(max = 255, message = "Убедитесь, что это значение содержит не более 255 символов."))]
    pub model: Option<String>,
    pub category: Option<CategoryField>,
    pub product_infos: Option<Vec<ProductInfoRequest>>,
}

/// Offers with their field errors collected under `product_infos`.
fn info_drafts(infos: Vec<ProductInfoRequest>) -> Result<Vec<ProductInfoDraft>, ApiError> {
    let mut errors = FieldErrors::default();
    let mut drafts = Vec::with_capacity(infos.len());

    for info in infos {
        if info.quantity < 0 {
            errors.add("product_infos", "Количество не может быть отрицательным.");
        }
        if info.description.chars().count() > 200 {
            errors.add("product_infos", "Убедитесь, что описание содержит не более 200 символов.");
        }
        let price = Price::new(info.price).map_err(|e| errors.add("product_infos", format!("price: {e}")));
        let price_rrc = Price::new(info.price_rrc).map_err(|e| errors.add("product_infos", format!("price_rrc: {e}")));
        let (Ok(price), Ok(price_rrc)) = (price, price_rrc) else {
            continue;
        };

        drafts.push(ProductInfoDraft {
            id: info.id,
            shop_id: info.shop,
            external_id: info.external_id,
            description: info.description,
            quantity: info.quantity,
            price,
            price_rrc,
            parameters: info.parameters.into_iter().map(|p| (p.parameter, p.value)).collect(),
        });
    }

    if errors.is_empty() {
        Ok(drafts)
    } else {
        Err(ApiError::Validation(errors))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProductFilters {
    pub shop: Option<i64>,
    pub category: Option<i64>,
    pub search: Option<String>,
}

pub(crate) async fn list_products(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(filters): Query<ProductFilters>,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<ProductResponse>>, ApiError> {
    user.require(STAFF)?;
    let page = PageRequest::from(params);

    let query = ProductQuery {
        shop: filters.shop,
        category: filters.category,
        search: filters.search,
        limit: page.limit,
        offset: Some(page.offset),
    };
    let products = app.catalog.list_products(query).await?;

    Ok(Json(Listing::new(products.map(ProductResponse::from), page, &uri)))
}

pub(crate) async fn get_product(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.catalog.get_product(id).await?.into()))
}

pub(crate) async fn create_product(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    user.require(STAFF)?;
    request.validate()?;

    let draft = ProductDraft {
        name: request.name,
        model: request.model,
        category: request.category.into_name(),
        product_infos: info_drafts(request.product_infos)?,
    };
    let product = app.catalog.create_product(draft).await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

pub(crate) async fn update_product(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<ProductPatchRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    user.require(STAFF)?;
    request.validate()?;

    let patch = ProductPatch {
        name: request.name,
        model: request.model,
        category: request.category.map(CategoryField::into_name),
        product_infos: request.product_infos.map(info_drafts).transpose()?,
    };

    Ok(Json(app.catalog.update_product(id, patch).await?.into()))
}

pub(crate) async fn delete_product(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(STAFF)?;

    app.catalog.delete_product(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct NameRequest {
    pub name: String,
}

pub(crate) async fn list_categories(
    State(app): State<AppContext>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Category>>, ApiError> {
    let page = PageRequest::from(params);

    Ok(Json(Listing::new(app.catalog.list_categories(page).await?, page, &uri)))
}

pub(crate) async fn get_category(
    State(app): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(app.catalog.get_category(id).await?))
}

pub(crate) async fn create_category(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    user.require(ADMIN)?;

    Ok((StatusCode::CREATED, Json(app.catalog.create_category(request.name).await?)))
}

pub(crate) async fn update_category(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<NameRequest>,
) -> Result<Json<Category>, ApiError> {
    user.require(ADMIN)?;

    Ok(Json(app.catalog.update_category(id, request.name).await?))
}

pub(crate) async fn delete_category(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(ADMIN)?;

    app.catalog.delete_category(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_parameters(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Parameter>>, ApiError> {
    user.require(STAFF)?;
    let page = PageRequest::from(params);

    Ok(Json(Listing::new(app.catalog.list_parameters(page).await?, page, &uri)))
}

pub(crate) async fn get_parameter(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Parameter>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.catalog.get_parameter(id).await?))
}

pub(crate) async fn create_parameter(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<Parameter>), ApiError> {
    user.require(STAFF)?;

    Ok((StatusCode::CREATED, Json(app.catalog.create_parameter(request.name).await?)))
}

pub(crate) async fn update_parameter(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<NameRequest>,
) -> Result<Json<Parameter>, ApiError> {
    user.require(STAFF)?;

    Ok(Json(app.catalog.update_parameter(id, request.name).await?))
}

pub(crate) async fn delete_parameter(
    State(app): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(STAFF)?;

    app.catalog.delete_parameter(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ShopRequest {
    #[validate(length(max = 100, message = "Убедитесь, что это значение содержит не более 100 символов."))]
    pub name: String,
    #[validate(url(message = "Введите правильный URL."))]
    pub url: Option<String>,
}

pub(crate) async fn list_shops(
    State(app): State<AppContext>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Shop>>, ApiError> {
    user.require(STAFF)?;
    let page = PageRequest::from(params);

    Ok(Json(Listing::new(app.catalog.list_shops(page).await?, page, &uri)))
}

pub(crate) async fn create_shop(
    State(app): State<AppContext>,
    user: AuthUser,
    Json(request): Json<ShopRequest>,
) -> Result<(StatusCode, Json<Shop>), ApiError> {
    let owner = user.require(STAFF)?;
    request.validate()?;

    let shop = app.catalog.create_shop(owner, NewShop { name: request.name, url: request.url }).await?;

    Ok((StatusCode::CREATED, Json(shop)))
}
