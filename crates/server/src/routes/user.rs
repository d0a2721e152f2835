//! Account route handlers.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use super::ApiJson;
use crate::error::{AppError, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::response::ApiResponse;
use crate::services::auth::AuthSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Register a customer account.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<RegisterForm>,
) -> Result<ApiResponse<AuthSession>, AppError> {
    let session = state
        .auth()
        .register(&form.email, &form.name, &form.password)
        .await?;
    add_breadcrumb("auth", "User registered", None);
    Ok(ApiResponse::created("Registration successful", session))
}

/// Exchange credentials for an access token.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<LoginForm>,
) -> Result<ApiResponse<AuthSession>, AppError> {
    let session = state.auth().login(&form.email, &form.password).await?;
    tracing::info!(user_id = %session.user.id, "User logged in");
    Ok(ApiResponse::ok("Login successful", session))
}

/// The signed-in user.
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<User>, AppError> {
    let user = state.auth().get_user(user.id).await?;
    Ok(ApiResponse::ok("Profile retrieved", user))
}
