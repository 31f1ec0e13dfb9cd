use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use crate::error::ApiError;

/// Identity established by the trust boundary filter.
///
/// Carries whatever the edge asserted in the trusted headers; by the
/// time a handler sees this, no cryptographic material is left — only
/// the subject and its roles.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("ADMIN")
    }
}

/// Extractor for routes that require an authenticated caller.
pub struct AuthUser(pub AuthContext);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Extractor for routes on the anonymous allow-list that still want to
/// know who is calling when someone is.
pub struct OptionalAuthUser(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(
            parts.extensions.get::<AuthContext>().cloned(),
        ))
    }
}
