//! Authentication extractors.
//!
//! Handlers declare what they need by taking [`RequireAuth`] or
//! [`RequireAdmin`]. The access token is read from `Authorization: Bearer …`
//! or, for older clients, a bare `token` header.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use cravecart_core::{Role, UserId};

use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{AuthError, Claims};
use crate::state::AppState;

/// The authenticated principal of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this user may see or act on something owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.id == owner || self.is_admin()
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.user_id(),
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Extractor that requires a valid access token.
///
/// # Example
///
/// ```rust,ignore
/// async fn profile(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub AuthUser);

/// Extractor that requires an admin's access token.
pub struct RequireAdmin(pub AuthUser);

fn bearer_token(parts: &Parts) -> Option<&str> {
    if let Some(value) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty());
    }
    parts
        .headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let user = AuthUser::from(state.tokens().verify(token)?);

        set_sentry_user(&user.id, Some(&user.email));
        tracing::Span::current().record("user_id", tracing::field::display(user.id));
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Admin route refused");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: (&str, &str)) -> Parts {
        let (parts, ()) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn reads_bearer_and_token_headers() {
        assert_eq!(
            bearer_token(&parts(("authorization", "Bearer abc.def"))),
            Some("abc.def")
        );
        assert_eq!(bearer_token(&parts(("token", "xyz"))), Some("xyz"));
        assert_eq!(bearer_token(&parts(("authorization", "Basic Zm9v"))), None);
        assert_eq!(bearer_token(&parts(("authorization", "Bearer "))), None);
    }

    #[test]
    fn admins_can_access_anything() {
        let customer = AuthUser {
            id: UserId::new(1),
            email: "a@example.com".to_string(),
            role: Role::Customer,
        };
        let admin = AuthUser {
            role: Role::Admin,
            ..customer.clone()
        };
        assert!(customer.can_access(UserId::new(1)));
        assert!(!customer.can_access(UserId::new(2)));
        assert!(admin.can_access(UserId::new(2)));
    }
}
