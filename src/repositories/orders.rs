//! Orders Repository

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, query_as, query_scalar, FromRow, Postgres, Transaction};
use std::collections::HashMap;

use crate::domain::aggregates::{Order, OrderItem, OrderLine, OrderStatus};

const FILTER_ORDERS_SQL: &str = "SELECT o.id, o.user_id, o.contact_id, o.dt, o.status FROM orders o \
    WHERE ($1::bigint IS NULL OR o.user_id = $1) \
      AND ($2::text IS NULL OR o.status = $2) \
      AND ($3::bigint IS NULL OR EXISTS ( \
            SELECT 1 FROM order_items oi JOIN shops s ON s.id = oi.shop_id \
            WHERE oi.order_id = o.id AND s.user_id = $3)) \
    ORDER BY o.dt DESC, o.id DESC LIMIT $4 OFFSET $5";

const COUNT_ORDERS_SQL: &str = "SELECT COUNT(*) FROM orders o \
    WHERE ($1::bigint IS NULL OR o.user_id = $1) \
      AND ($2::text IS NULL OR o.status = $2) \
      AND ($3::bigint IS NULL OR EXISTS ( \
            SELECT 1 FROM order_items oi JOIN shops s ON s.id = oi.shop_id \
            WHERE oi.order_id = o.id AND s.user_id = $3))";

const ORDER_ITEMS_SQL: &str = "SELECT oi.id, oi.order_id, oi.product_id, oi.shop_id, oi.quantity, \
        pi.price AS unit_price, s.user_id AS shop_owner_id \
    FROM order_items oi \
    JOIN shops s ON s.id = oi.shop_id \
    LEFT JOIN product_infos pi ON pi.product_id = oi.product_id AND pi.shop_id = oi.shop_id \
    WHERE oi.order_id = ANY($1) ORDER BY oi.id";

const UPSERT_ITEM_SQL: &str = "INSERT INTO order_items (order_id, product_id, shop_id, quantity) \
    VALUES ($1, $2, $3, $4) \
    ON CONFLICT (order_id, product_id, shop_id) DO UPDATE SET quantity = EXCLUDED.quantity";

const PRUNE_ITEMS_SQL: &str = "DELETE FROM order_items WHERE order_id = $1 \
    AND (product_id, shop_id) NOT IN (SELECT * FROM UNNEST($2::bigint[], $3::bigint[]))";

const ORDER_LINES_SQL: &str = "SELECT p.name AS product_name, s.id AS shop_id, s.name AS shop_name, oi.quantity \
    FROM order_items oi \
    JOIN products p ON p.id = oi.product_id \
    JOIN shops s ON s.id = oi.shop_id \
    WHERE oi.order_id = $1 AND ($2::bigint IS NULL OR oi.shop_id = $2) ORDER BY oi.id";

/// Order listing filters. `supplier` keeps orders containing items from shops the user owns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct OrderFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub supplier: Option<i64>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    contact_id: Option<i64>,
    dt: DateTime<Utc>,
    status: String,
}

#[derive(FromRow)]
struct ItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    shop_id: i64,
    quantity: i32,
    unit_price: Option<Decimal>,
    shop_owner_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgOrdersRepository;

impl PgOrdersRepository {
    pub(crate) fn new() -> Self { Self }

    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let rows = query_as::<Postgres, OrderRow>(FILTER_ORDERS_SQL)
            .bind(filter.user_id)
            .bind(filter.status.map(OrderStatus::as_str))
            .bind(filter.supplier)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&mut **tx)
            .await?;
        self.hydrate(tx, rows).await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>, filter: OrderFilter) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>(COUNT_ORDERS_SQL)
            .bind(filter.user_id)
            .bind(filter.status.map(OrderStatus::as_str))
            .bind(filter.supplier)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn find(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Order>, sqlx::Error> {
        let row = query_as::<Postgres, OrderRow>("SELECT id, user_id, contact_id, dt, status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(match row {
            Some(row) => self.hydrate(tx, vec![row]).await?.pop(),
            None => None,
        })
    }

    /// The user's open basket, locked for the rest of the transaction.
    pub(crate) async fn find_basket(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Option<Order>, sqlx::Error> {
        let row = query_as::<Postgres, OrderRow>(
            "SELECT id, user_id, contact_id, dt, status FROM orders \
             WHERE user_id = $1 AND status = 'new' ORDER BY id LIMIT 1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(match row {
            Some(row) => self.hydrate(tx, vec![row]).await?.pop(),
            None => None,
        })
    }

    pub(crate) async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        status: OrderStatus,
    ) -> Result<Order, sqlx::Error> {
        let row = query_as::<Postgres, OrderRow>(
            "INSERT INTO orders (user_id, status) VALUES ($1, $2) RETURNING id, user_id, contact_id, dt, status",
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await?;
        Ok(Order::restore(row.id, row.user_id, row.contact_id, row.dt, status, vec![]))
    }

    /// Persists status, contact and items. Items keep their row when the
    /// product and shop are unchanged; items no longer present are deleted.
    pub(crate) async fn save(&self, tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        query("UPDATE orders SET status = $2, contact_id = $3 WHERE id = $1")
            .bind(order.id())
            .bind(order.status().as_str())
            .bind(order.contact_id())
            .execute(&mut **tx)
            .await?;

        let product_ids: Vec<i64> = order.items().iter().map(|item| item.product_id).collect();
        let shop_ids: Vec<i64> = order.items().iter().map(|item| item.shop_id).collect();
        query(PRUNE_ITEMS_SQL)
            .bind(order.id())
            .bind(&product_ids[..])
            .bind(&shop_ids[..])
            .execute(&mut **tx)
            .await?;

        for item in order.items() {
            query(UPSERT_ITEM_SQL)
                .bind(order.id())
                .bind(item.product_id)
                .bind(item.shop_id)
                .bind(item.quantity)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64, sqlx::Error> {
        Ok(query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut **tx).await?.rows_affected())
    }

    /// Item lines with product and shop names, optionally limited to one shop.
    pub(crate) async fn lines(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        shop_id: Option<i64>,
    ) -> Result<Vec<OrderLine>, sqlx::Error> {
        query_as::<Postgres, OrderLine>(ORDER_LINES_SQL).bind(order_id).bind(shop_id).fetch_all(&mut **tx).await
    }

    async fn hydrate(&self, tx: &mut Transaction<'_, Postgres>, rows: Vec<OrderRow>) -> Result<Vec<Order>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let items = query_as::<Postgres, ItemRow>(ORDER_ITEMS_SQL).bind(&ids[..]).fetch_all(&mut **tx).await?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(OrderItem {
                id: Some(item.id),
                product_id: item.product_id,
                shop_id: item.shop_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                shop_owner_id: item.shop_owner_id,
            });
        }

        rows.into_iter()
            .map(|row| {
                let status = row
                    .status
                    .parse::<OrderStatus>()
                    .map_err(|e| sqlx::Error::ColumnDecode { index: "status".to_string(), source: Box::new(e) })?;
                let items = by_order.remove(&row.id).unwrap_or_default();
                Ok(Order::restore(row.id, row.user_id, row.contact_id, row.dt, status, items))
            })
            .collect()
    }
}
