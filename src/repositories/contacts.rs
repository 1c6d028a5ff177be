//! Contacts Repository

use sqlx::{query, query_as, query_scalar, Postgres, Transaction};

use crate::domain::aggregates::{Contact, ContactData};

const INSERT_CONTACT_SQL: &str = "INSERT INTO contacts \
    (user_id, city, street, house, structure, building, apartment, phone) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *";

const UPDATE_CONTACT_SQL: &str = "UPDATE contacts SET \
    city = $2, street = $3, house = $4, structure = $5, building = $6, apartment = $7, phone = $8 \
    WHERE id = $1 RETURNING *";

#[derive(Debug, Clone, Default)]
pub(crate) struct PgContactsRepository;

impl PgContactsRepository {
    pub(crate) fn new() -> Self { Self }

    /// Contacts of `owner`, or of everyone when `owner` is `None`.
    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner: Option<i64>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        query_as::<Postgres, Contact>(
            "SELECT * FROM contacts WHERE ($1::bigint IS NULL OR user_id = $1) ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut **tx)
        .await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>, owner: Option<i64>) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM contacts WHERE ($1::bigint IS NULL OR user_id = $1)")
            .bind(owner)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn find(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Contact>, sqlx::Error> {
        query_as::<Postgres, Contact>("SELECT * FROM contacts WHERE id = $1").bind(id).fetch_optional(&mut **tx).await
    }

    pub(crate) async fn first_for_user(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Option<Contact>, sqlx::Error> {
        query_as::<Postgres, Contact>("SELECT * FROM contacts WHERE user_id = $1 ORDER BY id LIMIT 1")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        data: &ContactData,
    ) -> Result<Contact, sqlx::Error> {
        query_as::<Postgres, Contact>(INSERT_CONTACT_SQL)
            .bind(user_id)
            .bind(&data.city)
            .bind(&data.street)
            .bind(&data.house)
            .bind(&data.structure)
            .bind(&data.building)
            .bind(&data.apartment)
            .bind(&data.phone)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        data: &ContactData,
    ) -> Result<Option<Contact>, sqlx::Error> {
        query_as::<Postgres, Contact>(UPDATE_CONTACT_SQL)
            .bind(id)
            .bind(&data.city)
            .bind(&data.street)
            .bind(&data.house)
            .bind(&data.structure)
            .bind(&data.building)
            .bind(&data.apartment)
            .bind(&data.phone)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64, sqlx::Error> {
        Ok(query("DELETE FROM contacts WHERE id = $1").bind(id).execute(&mut **tx).await?.rows_affected())
    }
}
