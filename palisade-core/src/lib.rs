//! Core authentication pipeline for the palisade storefront platform
//!
//! This crate holds everything security-critical and transport-free:
//! the account model with its brute-force lockout state, the signed
//! token codec, the storage contract with its per-account atomicity
//! guarantees, and the login orchestrator that drives the lockout
//! state machine.
//!
//! The HTTP surface — edge validation, trusted-header propagation, and
//! rate limiting — lives in the companion `palisade-axum` crate.

pub mod account;
pub mod error;
pub mod services;
pub mod storage;
pub mod token;
pub mod validation;

pub use account::{Account, LockoutState, NewAccount, Role};
pub use error::Error;
pub use services::{AuthConfig, AuthService, AuthenticatedLogin, LockoutConfig};
pub use storage::{AccountStore, MemoryAccountStore};
pub use token::{Claims, TokenCodec, TokenConfig};
