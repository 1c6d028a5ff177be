//! Request authentication.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::ApiError;
use crate::{
    context::AppContext,
    domain::aggregates::{Actor, User, UserRole},
    services::ServiceError,
};

/// The active user behind the request's bearer access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn actor(&self) -> Actor { self.0.actor() }

    /// The actor, provided their role is one of `roles`.
    pub fn require(&self, roles: &[UserRole]) -> Result<Actor, ApiError> {
        if self.0.has_role(roles) {
            Ok(self.actor())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, app: &AppContext) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;

        match app.accounts.authenticate(token.to_string()).await {
            Ok(user) => Ok(Self(user)),
            Err(ServiceError::Unauthenticated | ServiceError::NotFound | ServiceError::UserNotFound) => {
                Err(ApiError::Unauthenticated)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }

    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut request = Request::builder().uri("/");
        if let Some(value) = header {
            request = request.header(AUTHORIZATION, value);
        }
        request.body(()).map(|request| request.into_parts().0).unwrap()
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("bearer  abc "))), Some("abc"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
