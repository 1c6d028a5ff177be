//! Categories Repository

use sqlx::{query, query_as, query_scalar, Postgres, Transaction};

use crate::domain::aggregates::Category;

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCategoriesRepository;

impl PgCategoriesRepository {
    pub(crate) fn new() -> Self { Self }

    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Category>, sqlx::Error> {
        query_as::<Postgres, Category>("SELECT id, name FROM categories ORDER BY name, id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM categories").fetch_one(&mut **tx).await
    }

    pub(crate) async fn find(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Category>, sqlx::Error> {
        query_as::<Postgres, Category>("SELECT id, name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn create(&self, tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<Category, sqlx::Error> {
        query_as::<Postgres, Category>("INSERT INTO categories (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_or_create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<Category, sqlx::Error> {
        query_as::<Postgres, Category>(
            "INSERT INTO categories (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await
    }

    pub(crate) async fn rename(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        name: &str,
    ) -> Result<Option<Category>, sqlx::Error> {
        query_as::<Postgres, Category>("UPDATE categories SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64, sqlx::Error> {
        Ok(query("DELETE FROM categories WHERE id = $1").bind(id).execute(&mut **tx).await?.rows_affected())
    }

    pub(crate) async fn link_shop(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        category_id: i64,
        shop_id: i64,
    ) -> Result<(), sqlx::Error> {
        query("INSERT INTO category_shops (category_id, shop_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(category_id)
            .bind(shop_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
