//! Accounts service: registration, login, password reset and user administration.

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::sync::Arc;

use super::{FieldErrors, Page, PageRequest, ServiceError};
use crate::{
    auth::{
        confirmation_token, decode_uid, encode_uid, hash_password, reset_token, reset_token_expiry, verify_password,
        JwtKeys, TokenKind,
    },
    database::Db,
    domain::{
        aggregates::{Actor, NewUser, User, UserPatch, UserRole},
        events::{DomainEvent, UserEvent},
        value_objects::{password_violations, Email},
    },
    repositories::PgUsersRepository,
    tasks::{dispatch_events, TaskQueue},
};

const DUPLICATE_EMAIL: &str = "Пользователь с таким email уже существует.";
const UNKNOWN_EMAIL: &str = "Пользователь с таким email не найден.";
const BAD_CREDENTIALS: &str = "Не удалось войти с предоставленными учетными данными.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
}

/// Raw profile changes as submitted; validated into a [`UserPatch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginSession {
    pub user_id: i64,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct PgAccountsService {
    db: Db,
    keys: JwtKeys,
    queue: Arc<dyn TaskQueue>,
    users: PgUsersRepository,
}

impl PgAccountsService {
    #[must_use]
    pub fn new(db: Db, keys: JwtKeys, queue: Arc<dyn TaskQueue>) -> Self {
        Self { db, keys, queue, users: PgUsersRepository::new() }
    }
}

#[async_trait]
impl AccountsService for PgAccountsService {
    async fn register(&self, registration: Registration) -> Result<User, ServiceError> {
        let (email, role, mut errors) = check_registration(&registration);

        let mut tx = self.db.begin().await?;
        if let Some(email) = &email {
            if self.users.email_taken(&mut tx, email.as_str(), None).await? {
                errors.add("email", DUPLICATE_EMAIL);
            }
        }
        errors.into_result()?;
        let email = email.ok_or(ServiceError::InvalidData)?;

        let token = confirmation_token();
        let user = self
            .users
            .create(
                &mut tx,
                NewUser {
                    email,
                    password_hash: hash_password(&registration.password)?,
                    first_name: registration.first_name,
                    last_name: registration.last_name,
                    role,
                    is_active: false,
                    is_staff: false,
                    confirmation_token: Some(token.clone()),
                },
            )
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, role = %user.role, "user registered");
        dispatch_events(self.queue.as_ref(), vec![DomainEvent::User(UserEvent::Registered { user_id: user.id, token })])
            .await;

        Ok(user)
    }

    async fn confirm_registration(&self, token: String) -> Result<User, ServiceError> {
        let mut tx = self.db.begin().await?;
        let user = self.users.find_by_confirmation_token(&mut tx, &token).await?.ok_or(ServiceError::NotFound)?;
        self.users.activate(&mut tx, user.id).await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "account activated");
        Ok(User { is_active: true, confirmation_token: None, ..user })
    }

    async fn login(&self, email: String, password: String) -> Result<LoginSession, ServiceError> {
        let rejected = || ServiceError::field("non_field_errors", BAD_CREDENTIALS);

        let mut tx = self.db.begin().await?;
        let user = self.users.find_by_email(&mut tx, email.trim()).await?.ok_or_else(rejected)?;
        if !user.is_active || !verify_password(&password, &user.password_hash) {
            return Err(rejected());
        }
        self.users.touch_last_login(&mut tx, user.id).await?;
        tx.commit().await?;

        let pair = self.keys.issue_pair(user.id, user.role)?;
        Ok(LoginSession {
            user_id: user.id,
            email: user.email,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, ServiceError> {
        let claims = self.keys.verify(&refresh_token, TokenKind::Refresh)?;
        let user = self.active_user(claims.user_id()?).await?;
        Ok(self.keys.issue(user.id, user.role, TokenKind::Access)?)
    }

    async fn request_password_reset(&self, email: String) -> Result<(), ServiceError> {
        let email = Email::parse(&email).map_err(|e| ServiceError::field("email", e.to_string()))?;

        let mut tx = self.db.begin().await?;
        let user = self
            .users
            .find_by_email(&mut tx, email.as_str())
            .await?
            .ok_or_else(|| ServiceError::field("email", UNKNOWN_EMAIL))?;
        let token = reset_token();
        self.users.set_reset_token(&mut tx, user.id, &token, reset_token_expiry(Utc::now())).await?;
        tx.commit().await?;

        let event = UserEvent::PasswordResetRequested { user_id: user.id, uid: encode_uid(user.id), token };
        dispatch_events(self.queue.as_ref(), vec![DomainEvent::User(event)]).await;
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        uidb64: String,
        token: String,
        new_password: String,
    ) -> Result<(), ServiceError> {
        let user_id = decode_uid(&uidb64)?;

        let mut tx = self.db.begin().await?;
        let user = self.users.find(&mut tx, user_id).await?.ok_or(ServiceError::UserNotFound)?;
        if !user.reset_token_matches(&token, Utc::now()) {
            return Err(ServiceError::Rejected("Недействительный токен.".to_string()));
        }
        let email = Email::parse(&user.email).ok();
        let violations = password_violations(&new_password, email.as_ref());
        if !violations.is_empty() {
            let mut errors = FieldErrors::default();
            for violation in violations {
                errors.add("new_password", violation);
            }
            return Err(ServiceError::Validation(errors));
        }
        self.users.set_password(&mut tx, user.id, &hash_password(&new_password)?).await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "password reset");
        Ok(())
    }

    async fn authenticate(&self, access_token: String) -> Result<User, ServiceError> {
        let claims = self.keys.verify(&access_token, TokenKind::Access)?;
        self.active_user(claims.user_id()?).await
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.users.list(&mut tx, page.limit, page.offset).await?;
        let total = if page.is_paginated() { Some(self.users.count(&mut tx).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn get_user(&self, id: i64) -> Result<User, ServiceError> {
        let mut tx = self.db.begin().await?;
        let user = self.users.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(user)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User, ServiceError> {
        let mut errors = FieldErrors::default();
        let email = match update.email.as_deref().map(Email::parse).transpose() {
            Ok(email) => email,
            Err(e) => {
                errors.add("email", e.to_string());
                None
            }
        };
        let role = match update.role.as_deref().map(str::parse::<UserRole>).transpose() {
            Ok(role) => role,
            Err(e) => {
                errors.add("role", e.to_string());
                None
            }
        };

        let mut tx = self.db.begin().await?;
        if let Some(email) = &email {
            if self.users.email_taken(&mut tx, email.as_str(), Some(id)).await? {
                errors.add("email", DUPLICATE_EMAIL);
            }
        }
        errors.into_result()?;

        let patch = UserPatch { email, first_name: update.first_name, last_name: update.last_name, role };
        let user = self.users.update(&mut tx, id, patch).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(user)
    }

    async fn delete_user(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        if self.users.delete(&mut tx, id).await? == 0 {
            return Err(ServiceError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn toggle_activity(&self, actor: Actor, user_id: i64) -> Result<User, ServiceError> {
        if actor.id == user_id {
            return Err(ServiceError::Forbidden("Вы не можете изменить активность своего аккаунта.".to_string()));
        }

        let mut tx = self.db.begin().await?;
        let user = self.users.find(&mut tx, user_id).await?.ok_or(ServiceError::UserNotFound)?;
        let user = self.users.set_active(&mut tx, user.id, !user.is_active).await?.ok_or(ServiceError::UserNotFound)?;
        tx.commit().await?;

        tracing::info!(actor = actor.id, user_id, is_active = user.is_active, "user activity toggled");
        Ok(user)
    }

    async fn create_superuser(&self, email: String, password: String) -> Result<User, ServiceError> {
        let email = Email::parse(&email).map_err(|e| ServiceError::field("email", e.to_string()))?;

        let mut tx = self.db.begin().await?;
        if self.users.email_taken(&mut tx, email.as_str(), None).await? {
            return Err(ServiceError::field("email", DUPLICATE_EMAIL));
        }
        let user = self
            .users
            .create(
                &mut tx,
                NewUser {
                    email,
                    password_hash: hash_password(&password)?,
                    first_name: String::new(),
                    last_name: String::new(),
                    role: UserRole::Admin,
                    is_active: true,
                    is_staff: true,
                    confirmation_token: None,
                },
            )
            .await?;
        tx.commit().await?;
        Ok(user)
    }
}

impl PgAccountsService {
    async fn active_user(&self, id: i64) -> Result<User, ServiceError> {
        let mut tx = self.db.begin().await?;
        let user = self.users.find(&mut tx, id).await?;
        tx.commit().await?;
        user.filter(|user| user.is_active).ok_or(ServiceError::Unauthenticated)
    }
}

/// Checks everything about a registration that does not need storage.
fn check_registration(registration: &Registration) -> (Option<Email>, UserRole, FieldErrors) {
    let mut errors = FieldErrors::default();

    let email = match Email::parse(&registration.email) {
        Ok(email) => Some(email),
        Err(e) => {
            errors.add("email", e.to_string());
            None
        }
    };

    let role = match registration.role.as_deref().map(str::parse::<UserRole>).transpose() {
        Ok(role) => role.unwrap_or_default(),
        Err(e) => {
            errors.add("role", e.to_string());
            UserRole::default()
        }
    };

    let violations = password_violations(&registration.password, email.as_ref());
    if !violations.is_empty() {
        errors.add("password", format!("Ошибка валидации пароля: {}", violations.join(", ")));
    }

    (email, role, errors)
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountsService: Send + Sync {
    /// Creates an inactive account and queues the confirmation email.
    async fn register(&self, registration: Registration) -> Result<User, ServiceError>;

    /// Activates the account holding `token`.
    async fn confirm_registration(&self, token: String) -> Result<User, ServiceError>;

    async fn login(&self, email: String, password: String) -> Result<LoginSession, ServiceError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: String) -> Result<String, ServiceError>;

    async fn request_password_reset(&self, email: String) -> Result<(), ServiceError>;

    async fn confirm_password_reset(
        &self,
        uidb64: String,
        token: String,
        new_password: String,
    ) -> Result<(), ServiceError>;

    /// Resolves an access token to an active user.
    async fn authenticate(&self, access_token: String) -> Result<User, ServiceError>;

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>, ServiceError>;

    async fn get_user(&self, id: i64) -> Result<User, ServiceError>;

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User, ServiceError>;

    async fn delete_user(&self, id: i64) -> Result<(), ServiceError>;

    /// Flips `is_active` on another user's account.
    async fn toggle_activity(&self, actor: Actor, user_id: i64) -> Result<User, ServiceError>;

    async fn create_superuser(&self, email: String, password: String) -> Result<User, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            email: "buyer@example.com".into(),
            password: "Str0ngPassw0rd".into(),
            first_name: "Ivan".into(),
            last_name: "Petrov".into(),
            role: None,
        }
    }

    #[test]
    fn registration_defaults_to_customer() {
        let (email, role, errors) = check_registration(&registration());

        assert_eq!(email.map(|e| e.as_str().to_string()).as_deref(), Some("buyer@example.com"));
        assert_eq!(role, UserRole::Customer);
        assert!(errors.is_empty());
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let (_, _, errors) = check_registration(&Registration {
            email: "not-an-email".into(),
            password: "1234".into(),
            role: Some("root".into()),
            ..registration()
        });

        assert!(errors.get("email").is_some());
        assert_eq!(errors.get("role"), Some(&["Неверная роль пользователя.".to_string()][..]));
        let password = errors.get("password").unwrap();
        assert!(password[0].starts_with("Ошибка валидации пароля: "));
        assert!(password[0].contains("только из цифр"));
    }

    #[test]
    fn supplier_role_is_accepted() {
        let (_, role, errors) = check_registration(&Registration { role: Some("supplier".into()), ..registration() });
        assert_eq!(role, UserRole::Supplier);
        assert!(errors.is_empty());
    }
}
