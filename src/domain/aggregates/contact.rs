//! Delivery contacts

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::{is_valid_phone, PhoneError};

pub const MAX_CONTACTS_PER_USER: i64 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    pub city: String,
    pub street: String,
    pub house: String,
    pub structure: String,
    pub building: String,
    pub apartment: String,
    pub phone: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactData {
    pub city: String,
    pub street: String,
    pub house: String,
    pub structure: String,
    pub building: String,
    pub apartment: String,
    pub phone: String,
}

impl ContactData {
    pub fn validate(&self) -> Result<(), ContactError> {
        if !self.phone.is_empty() && !is_valid_phone(&self.phone) {
            return Err(ContactError::Phone(PhoneError::Invalid));
        }
        Ok(())
    }
}

/// Rejects a new contact once the user already has the maximum number.
pub fn ensure_contact_capacity(existing: i64) -> Result<(), ContactError> {
    if existing >= MAX_CONTACTS_PER_USER {
        return Err(ContactError::LimitReached);
    }
    Ok(())
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContactError {
    #[error("Максимум 5 адресов на пользователя.")]
    LimitReached,
    #[error(transparent)]
    Phone(#[from] PhoneError),
}
