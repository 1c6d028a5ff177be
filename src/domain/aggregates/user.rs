//! User accounts and roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::domain::value_objects::Email;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Customer,
    Supplier,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Customer, UserRole::Supplier, UserRole::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Supplier => "supplier",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for UserRole {
    type Err = UserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|role| role.as_str() == value).ok_or(UserError::UnknownRole)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("Неверная роль пользователя.")]
    UnknownRole,
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_staff: bool,
    pub confirmation_token: Option<String>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor { Actor { id: self.id, role: self.role } }

    pub fn has_role(&self, roles: &[UserRole]) -> bool { roles.contains(&self.role) }

    /// Whether `token` is the outstanding, unexpired password reset token.
    pub fn reset_token_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.password_reset_token, self.password_reset_expires_at) {
            (Some(expected), Some(expires_at)) => expected == token && now < expires_at,
            _ => false,
        }
    }
}

/// The identity a service acts on behalf of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool { self.role == UserRole::Admin }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_staff: bool,
    pub confirmation_token: Option<String>,
}

/// Partial update of the editable profile fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: 1,
            email: "customer@example.com".into(),
            password_hash: String::new(),
            first_name: "Customer".into(),
            last_name: "User".into(),
            role: UserRole::Customer,
            is_active: true,
            is_staff: false,
            confirmation_token: None,
            password_reset_token: None,
            password_reset_expires_at: None,
            last_login: None,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn roles_parse_from_wire_names() {
        assert_eq!("supplier".parse::<UserRole>(), Ok(UserRole::Supplier));
        assert_eq!("root".parse::<UserRole>(), Err(UserError::UnknownRole));
        assert_eq!(UserRole::Admin.to_string(), "admin");
    }

    #[test]
    fn reset_token_expires() {
        let now = Utc::now();
        let mut user = user();
        assert!(!user.reset_token_matches("abc", now));

        user.password_reset_token = Some("abc".into());
        user.password_reset_expires_at = Some(now + Duration::hours(1));
        assert!(user.reset_token_matches("abc", now));
        assert!(!user.reset_token_matches("abd", now));
        assert!(!user.reset_token_matches("abc", now + Duration::hours(2)));
    }
}
