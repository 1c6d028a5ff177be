//! Users Repository

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, query, query_as, query_scalar, FromRow, Postgres, Row, Transaction};

use crate::domain::aggregates::{NewUser, User, UserPatch, UserRole};

const INSERT_USER_SQL: &str = "INSERT INTO users \
    (email, password_hash, first_name, last_name, role, is_active, is_staff, confirmation_token) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *";

const UPDATE_USER_SQL: &str = "UPDATE users SET \
    email = COALESCE($2, email), \
    first_name = COALESCE($3, first_name), \
    last_name = COALESCE($4, last_name), \
    role = COALESCE($5, role) \
    WHERE id = $1 RETURNING *";

#[derive(Debug, Clone, Default)]
pub(crate) struct PgUsersRepository;

impl PgUsersRepository {
    pub(crate) fn new() -> Self { Self }

    pub(crate) async fn find(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<User>, sqlx::Error> {
        query_as::<Postgres, User>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&mut **tx).await
    }

    pub(crate) async fn find_by_email(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<Postgres, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn find_by_confirmation_token(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<Postgres, User>("SELECT * FROM users WHERE confirmation_token = $1")
            .bind(token)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn email_taken(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        email: &str,
        except: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        query_scalar::<Postgres, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::bigint IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&mut **tx)
        .await
    }

    pub(crate) async fn create(&self, tx: &mut Transaction<'_, Postgres>, user: NewUser) -> Result<User, sqlx::Error> {
        query_as::<Postgres, User>(INSERT_USER_SQL)
            .bind(user.email.as_str())
            .bind(user.password_hash)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.is_staff)
            .bind(user.confirmation_token)
            .fetch_one(&mut **tx)
            .await
    }

    /// Activates the account and consumes its confirmation token.
    pub(crate) async fn activate(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), sqlx::Error> {
        query("UPDATE users SET is_active = TRUE, confirmation_token = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub(crate) async fn touch_last_login(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), sqlx::Error> {
        query("UPDATE users SET last_login = NOW() WHERE id = $1").bind(id).execute(&mut **tx).await?;
        Ok(())
    }

    pub(crate) async fn set_reset_token(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        query("UPDATE users SET password_reset_token = $2, password_reset_expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(token)
            .bind(expires_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Stores a new password hash and invalidates any outstanding reset token.
    pub(crate) async fn set_password(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        query(
            "UPDATE users SET password_hash = $2, password_reset_token = NULL, password_reset_expires_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        query_as::<Postgres, User>("SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn count(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM users").fetch_one(&mut **tx).await
    }

    pub(crate) async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        patch: UserPatch,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<Postgres, User>(UPDATE_USER_SQL)
            .bind(id)
            .bind(patch.email.as_ref().map(|email| email.as_str().to_string()))
            .bind(patch.first_name)
            .bind(patch.last_name)
            .bind(patch.role.map(UserRole::as_str))
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn set_active(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        active: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<Postgres, User>("UPDATE users SET is_active = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(active)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64, sqlx::Error> {
        Ok(query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut **tx).await?.rows_affected())
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let role: String = row.try_get("role")?;
        let role = role
            .parse::<UserRole>()
            .map_err(|e| sqlx::Error::ColumnDecode { index: "role".to_string(), source: Box::new(e) })?;

        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            role,
            is_active: row.try_get("is_active")?,
            is_staff: row.try_get("is_staff")?,
            confirmation_token: row.try_get("confirmation_token")?,
            password_reset_token: row.try_get("password_reset_token")?,
            password_reset_expires_at: row.try_get("password_reset_expires_at")?,
            last_login: row.try_get("last_login")?,
            date_joined: row.try_get("date_joined")?,
        })
    }
}
