//! Application services
//!
//! Each service is a trait with a PostgreSQL-backed implementation. Handlers
//! only see the traits, which lets router tests run against mocks.

mod accounts;
mod catalog;
mod contacts;
mod orders;
mod partners;

pub use accounts::*;
pub use catalog::*;
pub use contacts::*;
pub use orders::*;
pub use partners::*;

use serde::Serialize;
use sqlx::error::{DatabaseError, ErrorKind};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    auth::AuthError,
    domain::{
        aggregates::{ContactError, OrderError},
        catalog_file::CatalogFileError,
    },
    tasks::TaskError,
};

/// Shared text of every permission refusal.
pub const NOT_ALLOWED: &str = "У вас недостаточно прав для выполнения этого действия.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Не найдено.")]
    NotFound,

    #[error("Пользователь не найден.")]
    UserNotFound,

    #[error("Объект с такими данными уже существует.")]
    AlreadyExists,

    #[error("Связанный объект не найден.")]
    InvalidReference,

    #[error("Некорректные данные.")]
    InvalidData,

    #[error("validation failed")]
    Validation(FieldErrors),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Contact(#[from] ContactError),

    #[error(transparent)]
    CatalogFile(#[from] CatalogFileError),

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Upload(String),

    #[error("Вы не авторизованы. Пожалуйста, войдите в систему.")]
    Unauthenticated,

    #[error("authentication failure: {0}")]
    Auth(#[source] AuthError),

    #[error("task queue failure: {0}")]
    Task(#[from] TaskError),

    #[error("storage error: {0}")]
    Sql(#[source] sqlx::Error),

    #[error("file storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation | ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken | AuthError::Expired => Self::Unauthenticated,
            AuthError::InvalidUid => Self::UserNotFound,
            other => Self::Auth(other),
        }
    }
}

/// Per-field validation messages, serialised as `{"field": ["message", ..]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, field: &str) -> Option<&[String]> { self.0.get(field).map(Vec::as_slice) }

    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = Self::default();
        for (field, errors) in errors.field_errors() {
            for error in errors {
                let message = error.message.as_ref().map_or_else(|| error.code.to_string(), ToString::to_string);
                fields.add(field, message);
            }
        }
        fields
    }
}

/// `limit`/`offset` window. Totals are only counted when a limit is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: i64,
}

impl PageRequest {
    pub fn is_paginated(&self) -> bool { self.limit.is_some() }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<i64>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), total: self.total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_group_by_field() {
        let mut errors = FieldErrors::single("email", "bad");
        errors.add("email", "taken");
        errors.add("role", "unknown");

        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({"email": ["bad", "taken"], "role": ["unknown"]})
        );
        assert!(matches!(errors.into_result(), Err(ServiceError::Validation(_))));
        assert!(FieldErrors::default().into_result().is_ok());
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        assert!(matches!(ServiceError::from(sqlx::Error::RowNotFound), ServiceError::NotFound));
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        assert!(matches!(ServiceError::from(AuthError::Expired), ServiceError::Unauthenticated));
    }
}
