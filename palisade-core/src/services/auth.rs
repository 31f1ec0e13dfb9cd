//! Login orchestration and brute-force lockout
//!
//! This module drives the account lockout state machine on every login
//! attempt:
//!
//! OPEN --(max consecutive failures)--> LOCKED --(lockout elapses)--> OPEN
//!
//! Lock expiry is evaluated lazily on the next attempt for that
//! account; there is no background sweeper. An unknown username fails
//! with the same error as a wrong password, so callers cannot probe
//! which usernames exist.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    Error,
    account::{Account, LockoutState, NewAccount},
    error::{AuthError, StorageError},
    storage::AccountStore,
    token::TokenCodec,
    validation::{validate_email, validate_password, validate_username},
};

/// Lockout behavior of the login state machine.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Consecutive failures that trip the lock.
    pub max_failed_attempts: u32,
    /// How long a tripped lock holds.
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub lockout: LockoutConfig,
    /// Validity of issued tokens.
    pub token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            lockout: LockoutConfig::default(),
            token_ttl: Duration::hours(24),
        }
    }
}

/// A successful login: the issued token plus the account as persisted
/// after the attempt.
#[derive(Debug, Clone)]
pub struct AuthenticatedLogin {
    pub token: String,
    pub account: Account,
}

/// Orchestrates registration, login, and password reset against an
/// [`AccountStore`] and a [`TokenCodec`].
///
/// Thread-safe; share it across tasks behind an `Arc`. Per-account
/// serialization of counter updates is the store's contract, not
/// something this service locks for.
pub struct AuthService<S: AccountStore> {
    store: Arc<S>,
    codec: Arc<TokenCodec>,
    config: AuthConfig,
}

impl<S: AccountStore> AuthService<S> {
    pub fn new(store: Arc<S>, codec: Arc<TokenCodec>, config: AuthConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Register a new account.
    ///
    /// Unlike login, registration reports taken identifiers
    /// distinctly: the caller already supplied them, so there is
    /// nothing to enumerate.
    pub async fn register(&self, new: NewAccount) -> Result<Account, Error> {
        validate_username(&new.username)?;
        validate_email(&new.email)?;
        validate_password(&new.password)?;

        if self.store.find_by_username(&new.username).await?.is_some() {
            return Err(Error::Auth(AuthError::UsernameTaken));
        }
        if self.store.find_by_email(&new.email).await?.is_some() {
            return Err(Error::Auth(AuthError::EmailTaken));
        }

        let hash = Self::hash_password(&new.password);
        let account = self
            .store
            .create(Account::from_registration(&new, hash))
            .await?;

        tracing::info!(username = %account.username, role = %account.role, "account registered");
        Ok(account)
    }

    /// Evaluate a login attempt against the lockout state machine.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthenticatedLogin, Error> {
        let now = Utc::now();
        let lockout = &self.config.lockout;

        let Some(account) = self.store.find_by_username(username).await? else {
            // Unknown usernames fail exactly like wrong passwords.
            tracing::warn!(username, "login attempt for unknown username");
            return Err(Error::Auth(AuthError::InvalidCredentials));
        };

        if !account.enabled {
            tracing::warn!(username, "login attempt for disabled account");
            return Err(Error::Auth(AuthError::AccountDisabled));
        }

        let mut account = account;
        match account.lockout_state(lockout.lockout_duration, now) {
            LockoutState::Open => {}
            LockoutState::Locked => {
                let retry_after_secs = account.lock_remaining_secs(lockout.lockout_duration, now);
                tracing::warn!(username, retry_after_secs, "login rejected, account locked");
                return Err(Error::Auth(AuthError::AccountLocked { retry_after_secs }));
            }
            LockoutState::ExpiredLock => {
                self.store.clear_lock(username).await?;
                account.unlock(now);
                tracing::info!(username, "lock expired, account reopened");
            }
        }

        if Self::verify_password(password, &account.password_hash) {
            self.store.record_login(username, now).await?;
            let token = self.codec.issue(
                &account.username,
                vec![account.role.to_string()],
                self.config.token_ttl,
            )?;

            let account = self
                .store
                .find_by_username(username)
                .await?
                .ok_or(Error::Storage(StorageError::NotFound))?;

            tracing::debug!(username, "login succeeded");
            return Ok(AuthenticatedLogin { token, account });
        }

        let count = self.store.record_login_failure(username).await?;
        if count >= lockout.max_failed_attempts {
            self.store.lock(username, now).await?;
            tracing::warn!(username, failed_attempts = count, "account locked after repeated failures");
            return Err(Error::Auth(AuthError::AccountLocked {
                retry_after_secs: lockout.lockout_duration.num_seconds().max(0) as u64,
            }));
        }

        tracing::debug!(username, failed_attempts = count, "invalid credentials");
        Err(Error::Auth(AuthError::InvalidCredentials))
    }

    /// Replace an account's password and unlock it.
    ///
    /// A completed password reset is an unlock mechanism: the party
    /// proving control of the account should not stay locked out by an
    /// attacker's earlier failed guesses.
    pub async fn reset_password(&self, username: &str, new_password: &str) -> Result<(), Error> {
        validate_password(new_password)?;

        let hash = Self::hash_password(new_password);
        self.store.set_password_hash(username, &hash).await?;
        self.store.clear_lock(username).await?;

        tracing::info!(username, "password reset");
        Ok(())
    }

    /// Read-only account fetch for profile routes.
    pub async fn get_account(&self, username: &str) -> Result<Option<Account>, Error> {
        self.store.find_by_username(username).await
    }

    fn hash_password(password: &str) -> String {
        password_auth::generate_hash(password)
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        password_auth::verify_password(password, hash).is_ok()
    }
}
