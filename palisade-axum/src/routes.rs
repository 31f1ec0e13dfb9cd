use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use palisade_core::{AccountStore, AuthService, NewAccount};

use crate::{
    error::{ApiError, Result},
    extractors::AuthUser,
    middleware::trust_boundary,
    types::*,
};

pub struct AppState<S: AccountStore> {
    pub auth: Arc<AuthService<S>>,
}

impl<S: AccountStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
        }
    }
}

/// Build the auth slice of the service router.
///
/// Registration, login, password reset, and health are the anonymous
/// allow-list; `/auth/me` and `/auth/logout` require the identity
/// established by the trust boundary filter, which wraps the whole
/// router.
pub fn create_router<S>(auth: Arc<AuthService<S>>) -> Router
where
    S: AccountStore,
{
    let state = AppState { auth };

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .layer(axum::middleware::from_fn(trust_boundary))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn register_handler<S>(
    State(state): State<AppState<S>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse>
where
    S: AccountStore,
{
    let mut builder = NewAccount::builder()
        .username(payload.username)
        .email(payload.email)
        .password(payload.password);
    if let Some(role) = payload.role {
        builder = builder.role(role);
    }
    let new = builder.build().map_err(ApiError::from)?;

    let account = state.auth.register(new).await.map_err(ApiError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: None,
            username: account.username,
            email: account.email,
            role: account.role,
            message: "User registered successfully".to_string(),
        }),
    ))
}

async fn login_handler<S>(
    State(state): State<AppState<S>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse>
where
    S: AccountStore,
{
    let login = state
        .auth
        .login(&payload.username, &payload.password)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(AuthResponse {
        token: Some(login.token),
        username: login.account.username,
        email: login.account.email,
        role: login.account.role,
        message: "Login successful".to_string(),
    }))
}

async fn reset_password_handler<S>(
    State(state): State<AppState<S>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse>
where
    S: AccountStore,
{
    state
        .auth
        .reset_password(&payload.username, &payload.new_password)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(MessageResponse::ok(format!(
        "Password reset successfully for user: {}",
        payload.username
    ))))
}

/// Tokens are stateless, so logout is a client-side discard; the route
/// exists so clients have a uniform call to end a session.
async fn logout_handler(_user: AuthUser) -> impl IntoResponse {
    Json(MessageResponse::ok("Logged out successfully"))
}

async fn me_handler<S>(
    State(state): State<AppState<S>>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse>
where
    S: AccountStore,
{
    let account = state
        .auth
        .get_account(&ctx.username)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(UserResponse {
        username: account.username,
        email: account.email,
        role: account.role,
        last_login: account.last_login,
    }))
}
