//! Account model and lockout state
//!
//! Accounts are the subjects of authentication. Besides the identity
//! fields they carry the brute-force lockout state machine's persistent
//! state: the failed-attempt counter, the locked flag, and the lock
//! timestamp. The state machine itself lives in
//! [`crate::services::AuthService`]; this module only provides the data
//! and the transitions on a single record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, error::ValidationError};

/// Role carried by an account and asserted in its tokens.
///
/// The set is closed: downstream authorization only ever switches on
/// these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// Lockout state derived from an account's lock flag and timestamp.
///
/// `ExpiredLock` is the transient view of an account whose lock has
/// outlived the lockout duration but has not been written back yet;
/// the login orchestrator reopens it on the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Open,
    Locked,
    ExpiredLock,
}

/// A registered account.
///
/// Invariants maintained by the mutation helpers:
/// `locked == lock_time.is_some()`, and the failed-attempt counter is
/// zero whenever the account transitions back to the open state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique login name, also the token subject.
    pub username: String,

    /// Unique contact address.
    pub email: String,

    /// Password hash. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,

    /// Administratively disabled accounts cannot authenticate.
    pub enabled: bool,

    pub locked: bool,

    /// Consecutive failed login attempts since the last success.
    pub failed_attempts: u32,

    /// Set when the account locks, cleared when it unlocks.
    pub lock_time: Option<DateTime<Utc>>,

    pub last_login: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Fresh record for a registration: counters zeroed, open state,
    /// enabled. The caller has already hashed the password.
    pub fn from_registration(new: &NewAccount, password_hash: String) -> Self {
        let now = Utc::now();
        Account {
            username: new.username.clone(),
            email: new.email.clone(),
            password_hash,
            role: new.role,
            enabled: true,
            locked: false,
            failed_attempts: 0,
            lock_time: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lock the account as of `now`.
    pub fn lock(&mut self, now: DateTime<Utc>) {
        self.locked = true;
        self.lock_time = Some(now);
        self.updated_at = now;
    }

    /// Return the account to the open state: flag, timestamp, and
    /// counter all reset together.
    pub fn unlock(&mut self, now: DateTime<Utc>) {
        self.locked = false;
        self.lock_time = None;
        self.failed_attempts = 0;
        self.updated_at = now;
    }

    /// Derive the lockout state as of `now`.
    ///
    /// Expiry is evaluated lazily on the next login attempt; nothing
    /// sweeps dormant accounts in the background.
    pub fn lockout_state(&self, lockout_duration: Duration, now: DateTime<Utc>) -> LockoutState {
        if !self.locked {
            return LockoutState::Open;
        }
        match self.lock_time {
            Some(locked_at) if now < locked_at + lockout_duration => LockoutState::Locked,
            _ => LockoutState::ExpiredLock,
        }
    }

    /// Seconds until an active lock expires, zero if not locked.
    pub fn lock_remaining_secs(&self, lockout_duration: Duration, now: DateTime<Utc>) -> u64 {
        match self.lock_time {
            Some(locked_at) => {
                let until = locked_at + lockout_duration;
                (until - now).num_seconds().max(0) as u64
            }
            None => 0,
        }
    }
}

/// Registration payload for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl NewAccount {
    pub fn builder() -> NewAccountBuilder {
        NewAccountBuilder::default()
    }
}

#[derive(Default)]
pub struct NewAccountBuilder {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<Role>,
}

impl NewAccountBuilder {
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn build(self) -> Result<NewAccount, Error> {
        Ok(NewAccount {
            username: self.username.ok_or(ValidationError::MissingField(
                "Username is required".to_string(),
            ))?,
            email: self.email.ok_or(ValidationError::MissingField(
                "Email is required".to_string(),
            ))?,
            password: self.password.ok_or(ValidationError::MissingField(
                "Password is required".to_string(),
            ))?,
            role: self.role.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        let now = Utc::now();
        Account {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Customer,
            enabled: true,
            locked: false,
            failed_attempts: 0,
            lock_time: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_sets_flag_and_timestamp() {
        let mut acct = account();
        let now = Utc::now();
        acct.lock(now);
        assert!(acct.locked);
        assert_eq!(acct.lock_time, Some(now));
    }

    #[test]
    fn unlock_resets_counter() {
        let mut acct = account();
        acct.failed_attempts = 5;
        acct.lock(Utc::now());
        acct.unlock(Utc::now());
        assert!(!acct.locked);
        assert_eq!(acct.lock_time, None);
        assert_eq!(acct.failed_attempts, 0);
    }

    #[test]
    fn lockout_state_is_time_based() {
        let mut acct = account();
        let now = Utc::now();
        assert_eq!(
            acct.lockout_state(Duration::minutes(15), now),
            LockoutState::Open
        );

        acct.lock(now - Duration::minutes(16));
        assert_eq!(
            acct.lockout_state(Duration::minutes(15), now),
            LockoutState::ExpiredLock
        );

        acct.lock(now - Duration::minutes(14));
        assert_eq!(
            acct.lockout_state(Duration::minutes(15), now),
            LockoutState::Locked
        );
        let remaining = acct.lock_remaining_secs(Duration::minutes(15), now);
        assert!(remaining > 0 && remaining <= 60);
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("CUSTOMER".parse::<Role>(), Ok(Role::Customer));
        assert!("ROOT".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "ADMIN");
    }

    #[test]
    fn password_hash_never_serializes() {
        let acct = account();
        let json = serde_json::to_string(&acct).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("hash"));
    }

    #[test]
    fn builder_requires_credentials() {
        let result = NewAccount::builder().username("bob").build();
        assert!(result.is_err());

        let new = NewAccount::builder()
            .username("bob")
            .email("bob@example.com")
            .password("secretpass123")
            .build()
            .unwrap();
        assert_eq!(new.role, Role::Customer);
    }
}
