//! Shops Repository

use sqlx::{query_as, query_scalar, Postgres, Transaction};

use crate::domain::aggregates::{NewShop, Shop};

#[derive(Debug, Clone, Default)]
pub(crate) struct PgShopsRepository;

impl PgShopsRepository {
    pub(crate) fn new() -> Self { Self }

    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Shop>, sqlx::Error> {
        query_as::<Postgres, Shop>("SELECT * FROM shops ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM shops").fetch_one(&mut **tx).await
    }

    pub(crate) async fn find(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Shop>, sqlx::Error> {
        query_as::<Postgres, Shop>("SELECT * FROM shops WHERE id = $1").bind(id).fetch_optional(&mut **tx).await
    }

    /// Shops owned by `user_id`, oldest first.
    pub(crate) async fn owned_by(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Vec<Shop>, sqlx::Error> {
        query_as::<Postgres, Shop>("SELECT * FROM shops WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        shop: NewShop,
        owner: Option<i64>,
    ) -> Result<Shop, sqlx::Error> {
        query_as::<Postgres, Shop>("INSERT INTO shops (name, url, user_id) VALUES ($1, $2, $3) RETURNING *")
            .bind(shop.name)
            .bind(shop.url)
            .bind(owner)
            .fetch_one(&mut **tx)
            .await
    }

    /// Finds a shop by name, creating it for `owner` when missing. An existing
    /// shop keeps its owner.
    pub(crate) async fn get_or_create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        owner: Option<i64>,
    ) -> Result<Shop, sqlx::Error> {
        query_as::<Postgres, Shop>(
            "INSERT INTO shops (name, user_id) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING *",
        )
        .bind(name)
        .bind(owner)
        .fetch_one(&mut **tx)
        .await
    }
}
