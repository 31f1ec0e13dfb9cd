//! Service layer for the authentication pipeline

mod auth;

pub use auth::{AuthConfig, AuthService, AuthenticatedLogin, LockoutConfig};
