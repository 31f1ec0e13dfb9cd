//! # Palisade Axum Integration
//!
//! Axum middleware and routes for the palisade authentication
//! pipeline. The crate serves both sides of the trust boundary:
//!
//! - **Edge gateway**: [`rate_limit`] caps per-client request rates
//!   before anything else runs, and [`edge_auth`] validates bearer
//!   tokens and rewrites the trusted identity headers on requests
//!   forwarded to internal services.
//! - **Internal services**: [`trust_boundary`] reads those headers as
//!   authoritative identity, and [`create_router`] mounts the auth
//!   routes (register, login, logout, me, reset-password, health).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade_core::{AuthConfig, AuthService, MemoryAccountStore, TokenCodec, TokenConfig};
//! use palisade_axum::{create_router, rate_limit, RateLimitConfig, RateLimitState, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryAccountStore::new());
//!     let codec = Arc::new(TokenCodec::new(TokenConfig::new(b"change-me".to_vec())));
//!     let auth = Arc::new(AuthService::new(store, codec, AuthConfig::default()));
//!
//!     let limiter = RateLimitState {
//!         limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
//!     };
//!     let app = create_router(auth)
//!         .layer(axum::middleware::from_fn_with_state(limiter, rate_limit));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod error;
mod extractors;
mod middleware;
mod rate_limit;
mod routes;
mod types;

pub use error::{ApiError, ErrorBody, Result};
pub use extractors::{AuthContext, AuthUser, OptionalAuthUser};
pub use middleware::{
    DEFAULT_ROLE, EdgeState, ROLES_HEADER, USERNAME_HEADER, edge_auth, sanitize_identity_headers,
    trust_boundary,
};
pub use rate_limit::{
    LIMIT_HEADER, REMAINING_HEADER, RETRY_AFTER_HEADER, RateLimitConfig, RateLimitDecision,
    RateLimitState, RateLimiter, rate_limit,
};
pub use routes::{AppState, create_router};
pub use types::{
    AuthResponse, HealthResponse, LoginRequest, MessageResponse, RegisterRequest,
    ResetPasswordRequest, UserResponse,
};
