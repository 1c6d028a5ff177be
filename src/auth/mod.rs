//! Authentication primitives: password hashing, JWT pairs and one-off tokens.

mod jwt;
mod password;
mod tokens;

pub use jwt::*;
pub use password::*;
pub use tokens::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token encoding failed")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("Неверная ссылка для сброса пароля.")]
    InvalidUid,
}
