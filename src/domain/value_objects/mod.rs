//! Value Objects for the marketplace

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Email address. Surrounding whitespace is dropped and the domain part lowercased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, EmailError> {
        let value = value.as_ref().trim();
        let (local, domain) = value.rsplit_once('@').ok_or(EmailError::Invalid)?;
        if local.is_empty() || local.contains('@') || local.chars().any(char::is_whitespace) {
            return Err(EmailError::Invalid);
        }
        let valid_domain = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains("..")
            && domain.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '.');
        if !valid_domain {
            return Err(EmailError::Invalid);
        }
        Ok(Self(format!("{local}@{}", domain.to_lowercase())))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn local_part(&self) -> &str { self.0.split('@').next().unwrap_or_default() }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for Email {
    type Error = EmailError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl From<Email> for String {
    fn from(value: Email) -> Self { value.0 }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Введите правильный адрес электронной почты.")]
    Invalid,
}

/// Phone number accepted by contacts: optional `+`, optional leading `1`, then 9 to 15 digits.
/// An empty value is allowed because the phone is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone(String);

impl Phone {
    pub fn parse(value: impl Into<String>) -> Result<Self, PhoneError> {
        let value = value.into();
        if value.is_empty() || is_valid_phone(&value) { Ok(Self(value)) } else { Err(PhoneError::Invalid) }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

/// Matches `^\+?1?\d{9,15}$`.
pub fn is_valid_phone(value: &str) -> bool {
    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let len = digits.len();
    (9..=15).contains(&len) || (len == 16 && digits.starts_with('1'))
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("Введите корректный номер телефона.")]
    Invalid,
}

/// Price in the shop's currency: two decimal places, at least 0.01, at most 10 digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    pub const MIN: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount < Self::MIN { return Err(PriceError::TooSmall); }
        if amount.normalize().scale() > 2 { return Err(PriceError::TooPrecise); }
        if amount >= Decimal::from(100_000_000) { return Err(PriceError::TooLarge); }
        let mut amount = amount;
        amount.rescale(2);
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal { self.0 }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self { value.0 }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("Убедитесь, что это значение больше либо равно 0.01.")]
    TooSmall,
    #[error("Убедитесь, что введено не более 2 знаков после запятой.")]
    TooPrecise,
    #[error("Убедитесь, что введено не более 10 цифр.")]
    TooLarge,
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password policy applied on registration and password reset.
/// Returns every violated rule so they can be reported together.
pub fn password_violations(password: &str, email: Option<&Email>) -> Vec<String> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(format!(
            "Введённый пароль слишком короткий. Он должен содержать как минимум {MIN_PASSWORD_LENGTH} символов."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        violations.push("Введённый пароль состоит только из цифр.".to_string());
    }
    if let Some(email) = email {
        let lowered = password.to_lowercase();
        if lowered == email.local_part().to_lowercase() || lowered == email.as_str().to_lowercase() {
            violations.push("Введённый пароль слишком похож на email.".to_string());
        }
    }
    violations
}
