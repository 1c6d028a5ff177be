//! Catalog service: products with their shop offers, categories, parameters and shops.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::{Postgres, Transaction};

use super::{Page, PageRequest, ServiceError};
use crate::{
    database::Db,
    domain::aggregates::{
        Actor, Category, NewShop, Parameter, Product, ProductDraft, ProductInfoDraft, ProductPatch, ProductQuery, Shop,
    },
    repositories::{PgCategoriesRepository, PgParametersRepository, PgProductsRepository, PgShopsRepository},
};

const MAX_NAME_LENGTH: usize = 80;

#[derive(Debug, Clone)]
pub struct PgCatalogService {
    db: Db,
    products: PgProductsRepository,
    categories: PgCategoriesRepository,
    parameters: PgParametersRepository,
    shops: PgShopsRepository,
}

impl PgCatalogService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            products: PgProductsRepository::new(),
            categories: PgCategoriesRepository::new(),
            parameters: PgParametersRepository::new(),
            shops: PgShopsRepository::new(),
        }
    }

    async fn write_parameters(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        info_id: i64,
        draft: &ProductInfoDraft,
    ) -> Result<(), ServiceError> {
        for (name, value) in &draft.parameters {
            let parameter = self.parameters.get_or_create(tx, name).await?;
            self.products.set_parameter(tx, info_id, parameter.id, value).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogService for PgCatalogService {
    async fn list_products(&self, query: ProductQuery) -> Result<Page<Product>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.products.list(&mut tx, &query).await?;
        let total = if query.limit.is_some() { Some(self.products.count(&mut tx, &query).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn get_product(&self, id: i64) -> Result<Product, ServiceError> {
        let mut tx = self.db.begin().await?;
        let product = self.products.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(product)
    }

    async fn create_product(&self, draft: ProductDraft) -> Result<Product, ServiceError> {
        check_name("name", &draft.name)?;
        check_name("category", &draft.category)?;

        let mut tx = self.db.begin().await?;
        let category = self.categories.get_or_create(&mut tx, draft.category.trim()).await?;
        let product_id = self.products.create(&mut tx, draft.name.trim(), &draft.model, category.id).await?;
        for info in &draft.product_infos {
            let info_id = self.products.upsert_info(&mut tx, product_id, info).await?;
            self.categories.link_shop(&mut tx, category.id, info.shop_id).await?;
            self.write_parameters(&mut tx, info_id, info).await?;
        }
        let product = self.products.find(&mut tx, product_id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;

        tracing::info!(product_id, offers = product.product_infos.len(), "product created");
        Ok(product)
    }

    async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, ServiceError> {
        if let Some(name) = &patch.name {
            check_name("name", name)?;
        }

        let mut tx = self.db.begin().await?;
        let category_id = match patch.category.as_deref() {
            Some(name) => {
                check_name("category", name)?;
                Some(self.categories.get_or_create(&mut tx, name.trim()).await?.id)
            }
            None => None,
        };
        let updated = self
            .products
            .update(&mut tx, id, patch.name.as_deref().map(str::trim), patch.model.as_deref(), category_id)
            .await?;
        if updated == 0 {
            return Err(ServiceError::NotFound);
        }

        for info in patch.product_infos.iter().flatten() {
            let info_id = match info.id {
                Some(info_id) => {
                    self.products.update_info(&mut tx, info_id, id, info).await?.ok_or(ServiceError::InvalidReference)?
                }
                None => self.products.upsert_info(&mut tx, id, info).await?,
            };
            self.write_parameters(&mut tx, info_id, info).await?;
        }

        let product = self.products.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        if self.products.delete(&mut tx, id).await? == 0 {
            return Err(ServiceError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_categories(&self, page: PageRequest) -> Result<Page<Category>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.categories.list(&mut tx, page.limit, page.offset).await?;
        let total = if page.is_paginated() { Some(self.categories.count(&mut tx).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn get_category(&self, id: i64) -> Result<Category, ServiceError> {
        let mut tx = self.db.begin().await?;
        let category = self.categories.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(category)
    }

    async fn create_category(&self, name: String) -> Result<Category, ServiceError> {
        check_name("name", &name)?;
        let mut tx = self.db.begin().await?;
        let category = self.categories.create(&mut tx, name.trim()).await?;
        tx.commit().await?;
        Ok(category)
    }

    async fn update_category(&self, id: i64, name: String) -> Result<Category, ServiceError> {
        check_name("name", &name)?;
        let mut tx = self.db.begin().await?;
        let category = self.categories.rename(&mut tx, id, name.trim()).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(category)
    }

    async fn delete_category(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        if self.categories.delete(&mut tx, id).await? == 0 {
            return Err(ServiceError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_parameters(&self, page: PageRequest) -> Result<Page<Parameter>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.parameters.list(&mut tx, page.limit, page.offset).await?;
        let total = if page.is_paginated() { Some(self.parameters.count(&mut tx).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn get_parameter(&self, id: i64) -> Result<Parameter, ServiceError> {
        let mut tx = self.db.begin().await?;
        let parameter = self.parameters.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(parameter)
    }

    async fn create_parameter(&self, name: String) -> Result<Parameter, ServiceError> {
        check_name("name", &name)?;
        let mut tx = self.db.begin().await?;
        let parameter = self.parameters.create(&mut tx, name.trim()).await?;
        tx.commit().await?;
        Ok(parameter)
    }

    async fn update_parameter(&self, id: i64, name: String) -> Result<Parameter, ServiceError> {
        check_name("name", &name)?;
        let mut tx = self.db.begin().await?;
        let parameter = self.parameters.rename(&mut tx, id, name.trim()).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(parameter)
    }

    async fn delete_parameter(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        if self.parameters.delete(&mut tx, id).await? == 0 {
            return Err(ServiceError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_shops(&self, page: PageRequest) -> Result<Page<Shop>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.shops.list(&mut tx, page.limit, page.offset).await?;
        let total = if page.is_paginated() { Some(self.shops.count(&mut tx).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn create_shop(&self, owner: Actor, shop: NewShop) -> Result<Shop, ServiceError> {
        check_name("name", &shop.name)?;
        let mut tx = self.db.begin().await?;
        let shop = NewShop { name: shop.name.trim().to_string(), ..shop };
        let shop = self.shops.create(&mut tx, shop, Some(owner.id)).await?;
        tx.commit().await?;

        tracing::info!(shop_id = shop.id, owner = owner.id, "shop created");
        Ok(shop)
    }
}

fn check_name(field: &str, name: &str) -> Result<(), ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::field(field, "Это поле не может быть пустым."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::field(
            field,
            format!("Убедитесь, что это значение содержит не более {MAX_NAME_LENGTH} символов."),
        ));
    }
    Ok(())
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Products matching the shop, category and search filters.
    async fn list_products(&self, query: ProductQuery) -> Result<Page<Product>, ServiceError>;

    async fn get_product(&self, id: i64) -> Result<Product, ServiceError>;

    /// Creates a product with its offers. The category is created on first use.
    async fn create_product(&self, draft: ProductDraft) -> Result<Product, ServiceError>;

    async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, ServiceError>;

    async fn delete_product(&self, id: i64) -> Result<(), ServiceError>;

    async fn list_categories(&self, page: PageRequest) -> Result<Page<Category>, ServiceError>;

    async fn get_category(&self, id: i64) -> Result<Category, ServiceError>;

    async fn create_category(&self, name: String) -> Result<Category, ServiceError>;

    async fn update_category(&self, id: i64, name: String) -> Result<Category, ServiceError>;

    async fn delete_category(&self, id: i64) -> Result<(), ServiceError>;

    async fn list_parameters(&self, page: PageRequest) -> Result<Page<Parameter>, ServiceError>;

    async fn get_parameter(&self, id: i64) -> Result<Parameter, ServiceError>;

    async fn create_parameter(&self, name: String) -> Result<Parameter, ServiceError>;

    async fn update_parameter(&self, id: i64, name: String) -> Result<Parameter, ServiceError>;

    async fn delete_parameter(&self, id: i64) -> Result<(), ServiceError>;

    async fn list_shops(&self, page: PageRequest) -> Result<Page<Shop>, ServiceError>;

    /// Creates a shop owned by `owner`.
    async fn create_shop(&self, owner: Actor, shop: NewShop) -> Result<Shop, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_present_and_short() {
        assert!(check_name("name", "Смартфоны").is_ok());
        assert!(matches!(check_name("name", "   "), Err(ServiceError::Validation(_))));

        let Err(ServiceError::Validation(errors)) = check_name("category", &"x".repeat(81)) else {
            panic!("expected a validation error");
        };
        assert!(errors.get("category").is_some());
    }
}
