//! Products Repository
//!
//! Products are stored across `products`, `product_infos` (one row per shop
//! offering the product) and `product_parameters`. Reads assemble the full
//! aggregate with three queries instead of one row per parameter.

use rust_decimal::Decimal;
use sqlx::{query, query_as, query_scalar, FromRow, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};

use crate::domain::{
    aggregates::{Category, Offer, Product, ProductInfo, ProductInfoDraft, ProductQuery, Supplier},
    catalog_file::{
        CatalogExport, ExportCategory, ExportParameter, ExportProduct, ExportProductInfo, ExportProductParameter,
        ExportShop,
    },
};

const FILTER_PRODUCTS_SQL: &str = "SELECT p.id, p.name, p.model, c.id AS category_id, c.name AS category_name \
    FROM products p JOIN categories c ON c.id = p.category_id \
    WHERE ($1::bigint IS NULL OR p.category_id = $1) \
      AND ($2::bigint IS NULL OR EXISTS (SELECT 1 FROM product_infos pi WHERE pi.product_id = p.id AND pi.shop_id = $2)) \
      AND ($3::text IS NULL OR p.name ILIKE $3 OR p.model ILIKE $3) \
    ORDER BY p.id LIMIT $4 OFFSET $5";

const COUNT_PRODUCTS_SQL: &str = "SELECT COUNT(*) FROM products p \
    WHERE ($1::bigint IS NULL OR p.category_id = $1) \
      AND ($2::bigint IS NULL OR EXISTS (SELECT 1 FROM product_infos pi WHERE pi.product_id = p.id AND pi.shop_id = $2)) \
      AND ($3::text IS NULL OR p.name ILIKE $3 OR p.model ILIKE $3)";

const GET_PRODUCT_SQL: &str = "SELECT p.id, p.name, p.model, c.id AS category_id, c.name AS category_name \
    FROM products p JOIN categories c ON c.id = p.category_id WHERE p.id = $1";

const INFOS_SQL: &str = "SELECT id, product_id, shop_id, external_id, description, quantity, price, price_rrc \
    FROM product_infos WHERE product_id = ANY($1) ORDER BY id";

const INFO_PARAMETERS_SQL: &str = "SELECT pp.product_info_id, p.name, pp.value \
    FROM product_parameters pp JOIN parameters p ON p.id = pp.parameter_id \
    WHERE pp.product_info_id = ANY($1)";

const UPSERT_INFO_SQL: &str = "INSERT INTO product_infos \
    (product_id, shop_id, external_id, description, quantity, price, price_rrc) \
    VALUES ($1, $2, $3, $4, $5, $6, $7) \
    ON CONFLICT (product_id, shop_id) DO UPDATE SET \
        external_id = EXCLUDED.external_id, description = EXCLUDED.description, \
        quantity = EXCLUDED.quantity, price = EXCLUDED.price, price_rrc = EXCLUDED.price_rrc \
    RETURNING id";

const UPDATE_INFO_SQL: &str = "UPDATE product_infos SET \
    shop_id = $3, external_id = $4, description = $5, quantity = $6, price = $7, price_rrc = $8 \
    WHERE id = $1 AND product_id = $2 RETURNING id";

const OFFERS_SQL: &str = "SELECT pi.product_id, pi.shop_id, pi.price, pi.quantity AS stock, \
        u.id AS owner_id, u.email AS owner_email, u.is_active AS owner_active \
    FROM product_infos pi \
    JOIN shops s ON s.id = pi.shop_id \
    LEFT JOIN users u ON u.id = s.user_id \
    WHERE pi.product_id = ANY($1) AND pi.shop_id = ANY($2)";

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    model: String,
    category_id: i64,
    category_name: String,
}

#[derive(FromRow)]
struct InfoRow {
    id: i64,
    product_id: i64,
    shop_id: i64,
    external_id: Option<String>,
    description: String,
    quantity: i32,
    price: Decimal,
    price_rrc: Decimal,
}

#[derive(FromRow)]
struct ParameterValueRow {
    product_info_id: i64,
    name: String,
    value: String,
}

#[derive(FromRow)]
struct OfferRow {
    product_id: i64,
    shop_id: i64,
    price: Decimal,
    stock: i32,
    owner_id: Option<i64>,
    owner_email: Option<String>,
    owner_active: Option<bool>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        let supplier = match (row.owner_id, row.owner_email) {
            (Some(user_id), Some(email)) => {
                Some(Supplier { user_id, email, is_active: row.owner_active.unwrap_or(false) })
            }
            _ => None,
        };
        Self { product_id: row.product_id, shop_id: row.shop_id, price: row.price, stock: row.stock, supplier }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgProductsRepository;

impl PgProductsRepository {
    pub(crate) fn new() -> Self { Self }

    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: &ProductQuery,
    ) -> Result<Vec<Product>, sqlx::Error> {
        let rows = query_as::<Postgres, ProductRow>(FILTER_PRODUCTS_SQL)
            .bind(filter.category)
            .bind(filter.shop)
            .bind(filter.search_pattern())
            .bind(filter.limit)
            .bind(filter.offset.unwrap_or(0))
            .fetch_all(&mut **tx)
            .await?;
        self.hydrate(tx, rows).await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>, filter: &ProductQuery) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>(COUNT_PRODUCTS_SQL)
            .bind(filter.category)
            .bind(filter.shop)
            .bind(filter.search_pattern())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn find(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Product>, sqlx::Error> {
        let Some(row) = query_as::<Postgres, ProductRow>(GET_PRODUCT_SQL).bind(id).fetch_optional(&mut **tx).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(tx, vec![row]).await?.pop())
    }

    pub(crate) async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        model: &str,
        category_id: i64,
    ) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>("INSERT INTO products (name, model, category_id) VALUES ($1, $2, $3) RETURNING id")
            .bind(name)
            .bind(model)
            .bind(category_id)
            .fetch_one(&mut **tx)
            .await
    }

    /// Creates the product or refreshes its model and category when the name exists.
    pub(crate) async fn upsert_by_name(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        model: &str,
        category_id: i64,
    ) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>(
            "INSERT INTO products (name, model, category_id) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET model = EXCLUDED.model, category_id = EXCLUDED.category_id \
             RETURNING id",
        )
        .bind(name)
        .bind(model)
        .bind(category_id)
        .fetch_one(&mut **tx)
        .await
    }

    pub(crate) async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        name: Option<&str>,
        model: Option<&str>,
        category_id: Option<i64>,
    ) -> Result<u64, sqlx::Error> {
        Ok(query(
            "UPDATE products SET name = COALESCE($2, name), model = COALESCE($3, model), \
             category_id = COALESCE($4, category_id) WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(model)
        .bind(category_id)
        .execute(&mut **tx)
        .await?
        .rows_affected())
    }

    pub(crate) async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64, sqlx::Error> {
        Ok(query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut **tx).await?.rows_affected())
    }

    /// Creates or refreshes the offer of `draft.shop_id` for the product.
    pub(crate) async fn upsert_info(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        draft: &ProductInfoDraft,
    ) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>(UPSERT_INFO_SQL)
            .bind(product_id)
            .bind(draft.shop_id)
            .bind(draft.external_id.as_deref())
            .bind(&draft.description)
            .bind(draft.quantity)
            .bind(draft.price.amount())
            .bind(draft.price_rrc.amount())
            .fetch_one(&mut **tx)
            .await
    }

    /// Updates an offer addressed by id. `None` when it does not belong to the product.
    pub(crate) async fn update_info(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        info_id: i64,
        product_id: i64,
        draft: &ProductInfoDraft,
    ) -> Result<Option<i64>, sqlx::Error> {
        query_scalar::<Postgres, i64>(UPDATE_INFO_SQL)
            .bind(info_id)
            .bind(product_id)
            .bind(draft.shop_id)
            .bind(draft.external_id.as_deref())
            .bind(&draft.description)
            .bind(draft.quantity)
            .bind(draft.price.amount())
            .bind(draft.price_rrc.amount())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn set_parameter(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_info_id: i64,
        parameter_id: i64,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        query(
            "INSERT INTO product_parameters (product_info_id, parameter_id, value) VALUES ($1, $2, $3) \
             ON CONFLICT (product_info_id, parameter_id) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(product_info_id)
        .bind(parameter_id)
        .bind(value)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Current offers for the given product and shop ids, with the owning supplier.
    pub(crate) async fn offers(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_ids: &[i64],
        shop_ids: &[i64],
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let rows = query_as::<Postgres, OfferRow>(OFFERS_SQL)
            .bind(product_ids)
            .bind(shop_ids)
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows.into_iter().map(Offer::from).collect())
    }

    pub(crate) async fn export(&self, tx: &mut Transaction<'_, Postgres>) -> Result<CatalogExport, sqlx::Error> {
        Ok(CatalogExport {
            shops: query_as::<Postgres, ExportShop>("SELECT name, url FROM shops ORDER BY id")
                .fetch_all(&mut **tx)
                .await?,
            categories: query_as::<Postgres, ExportCategory>("SELECT id, name FROM categories ORDER BY id")
                .fetch_all(&mut **tx)
                .await?,
            products: query_as::<Postgres, ExportProduct>(
                "SELECT p.id, p.name, p.model, c.name AS category \
                 FROM products p JOIN categories c ON c.id = p.category_id ORDER BY p.id",
            )
            .fetch_all(&mut **tx)
            .await?,
            product_infos: query_as::<Postgres, ExportProductInfo>(
                "SELECT p.name AS product, s.name AS shop, pi.external_id, pi.description, pi.quantity, \
                        pi.price, pi.price_rrc \
                 FROM product_infos pi \
                 JOIN products p ON p.id = pi.product_id \
                 JOIN shops s ON s.id = pi.shop_id ORDER BY pi.id",
            )
            .fetch_all(&mut **tx)
            .await?,
            parameters: query_as::<Postgres, ExportParameter>("SELECT id, name FROM parameters ORDER BY id")
                .fetch_all(&mut **tx)
                .await?,
            product_parameters: query_as::<Postgres, ExportProductParameter>(
                "SELECT pi.description AS product_info, p.name AS parameter, pp.value \
                 FROM product_parameters pp \
                 JOIN product_infos pi ON pi.id = pp.product_info_id \
                 JOIN parameters p ON p.id = pp.parameter_id ORDER BY pp.id",
            )
            .fetch_all(&mut **tx)
            .await?,
        })
    }

    async fn hydrate(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: Vec<ProductRow>,
    ) -> Result<Vec<Product>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let product_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let infos = query_as::<Postgres, InfoRow>(INFOS_SQL).bind(&product_ids[..]).fetch_all(&mut **tx).await?;

        let info_ids: Vec<i64> = infos.iter().map(|info| info.id).collect();
        let values = query_as::<Postgres, ParameterValueRow>(INFO_PARAMETERS_SQL)
            .bind(&info_ids[..])
            .fetch_all(&mut **tx)
            .await?;

        let mut parameters: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        for value in values {
            parameters.entry(value.product_info_id).or_default().insert(value.name, value.value);
        }

        let mut offers: HashMap<i64, Vec<ProductInfo>> = HashMap::new();
        for info in infos {
            offers.entry(info.product_id).or_default().push(ProductInfo {
                id: info.id,
                product_id: info.product_id,
                shop_id: info.shop_id,
                external_id: info.external_id,
                description: info.description,
                quantity: info.quantity,
                price: info.price,
                price_rrc: info.price_rrc,
                parameters: parameters.remove(&info.id).unwrap_or_default(),
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| Product {
                id: row.id,
                name: row.name,
                model: row.model,
                category: Category { id: row.category_id, name: row.category_name },
                product_infos: offers.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }
}
