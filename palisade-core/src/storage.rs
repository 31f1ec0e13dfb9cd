//! Account persistence contract
//!
//! The pipeline reads and writes one account at a time; there are no
//! cross-account invariants. What the contract does demand is that
//! every mutation on a single account is atomic: concurrent login
//! attempts against the same username must serialize their
//! read-increment-write sequences, so N simultaneous failures produce
//! exactly N increments.
//!
//! [`MemoryAccountStore`] is the bundled backend. Durable storage is a
//! deployment concern wired in behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    Error,
    account::Account,
    error::{AuthError, StorageError},
};

/// Storage contract for accounts.
///
/// The counter/lock/login mutations exist as dedicated operations
/// (rather than a generic `update`) so implementations can make each
/// one atomic per account.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Persist a new account. Fails with [`AuthError::UsernameTaken`]
    /// or [`AuthError::EmailTaken`] on uniqueness violations.
    async fn create(&self, account: Account) -> Result<Account, Error>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    /// Atomically increment the failed-attempt counter and return the
    /// new count.
    async fn record_login_failure(&self, username: &str) -> Result<u32, Error>;

    /// Lock the account as of `at`.
    async fn lock(&self, username: &str, at: DateTime<Utc>) -> Result<(), Error>;

    /// Clear the lock flag, lock timestamp, and failed-attempt counter
    /// together.
    async fn clear_lock(&self, username: &str) -> Result<(), Error>;

    /// Record a successful login: reset the counter and stamp
    /// last-login.
    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<(), Error>;

    /// Replace the stored password hash.
    async fn set_password_hash(&self, username: &str, hash: &str) -> Result<(), Error>;
}

/// In-memory account store backed by a concurrent map.
///
/// Each mutation runs under the map's per-key entry guard, which gives
/// the atomicity the [`AccountStore`] contract requires without any
/// store-wide lock.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
    emails: DashMap<String, String>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_account<T>(
        &self,
        username: &str,
        f: impl FnOnce(&mut Account) -> T,
    ) -> Result<T, Error> {
        match self.accounts.get_mut(username) {
            Some(mut entry) => Ok(f(entry.value_mut())),
            None => Err(Error::Storage(StorageError::NotFound)),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, account: Account) -> Result<Account, Error> {
        use dashmap::mapref::entry::Entry;

        match self.emails.entry(account.email.clone()) {
            Entry::Occupied(_) => return Err(Error::Auth(AuthError::EmailTaken)),
            Entry::Vacant(slot) => slot.insert(account.username.clone()),
        };

        match self.accounts.entry(account.username.clone()) {
            Entry::Occupied(_) => {
                self.emails.remove(&account.email);
                Err(Error::Auth(AuthError::UsernameTaken))
            }
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, Error> {
        Ok(self.accounts.get(username).map(|e| e.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        match self.emails.get(email) {
            Some(username) => self.find_by_username(username.value()).await,
            None => Ok(None),
        }
    }

    async fn record_login_failure(&self, username: &str) -> Result<u32, Error> {
        self.with_account(username, |acct| {
            acct.failed_attempts += 1;
            acct.updated_at = Utc::now();
            acct.failed_attempts
        })
    }

    async fn lock(&self, username: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.with_account(username, |acct| acct.lock(at))
    }

    async fn clear_lock(&self, username: &str) -> Result<(), Error> {
        self.with_account(username, |acct| acct.unlock(Utc::now()))
    }

    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.with_account(username, |acct| {
            acct.failed_attempts = 0;
            acct.last_login = Some(at);
            acct.updated_at = at;
        })
    }

    async fn set_password_hash(&self, username: &str, hash: &str) -> Result<(), Error> {
        self.with_account(username, |acct| {
            acct.password_hash = hash.to_string();
            acct.updated_at = Utc::now();
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::account::{NewAccount, Role};

    fn new_account(username: &str, email: &str) -> Account {
        Account::from_registration(
            &NewAccount {
                username: username.to_string(),
                email: email.to_string(),
                password: "unused".to_string(),
                role: Role::Customer,
            },
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let store = MemoryAccountStore::new();
        store
            .create(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        let by_name = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.email, "alice@example.com");

        let by_email = store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.username, "alice");

        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let store = MemoryAccountStore::new();
        store
            .create(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create(new_account("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UsernameTaken)));

        // The losing create must not leave its email claimed
        assert!(
            store
                .find_by_email("other@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = MemoryAccountStore::new();
        store
            .create(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create(new_account("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn mutations_on_unknown_account_fail() {
        let store = MemoryAccountStore::new();
        assert!(store.record_login_failure("ghost").await.is_err());
        assert!(store.lock("ghost", Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_failures_count_exactly() {
        let store = Arc::new(MemoryAccountStore::new());
        store
            .create(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_login_failure("alice").await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let acct = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(acct.failed_attempts, 50);
    }

    #[tokio::test]
    async fn record_login_resets_counter() {
        let store = MemoryAccountStore::new();
        store
            .create(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        store.record_login_failure("alice").await.unwrap();
        store.record_login_failure("alice").await.unwrap();

        let at = Utc::now();
        store.record_login("alice", at).await.unwrap();

        let acct = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(acct.failed_attempts, 0);
        assert_eq!(acct.last_login, Some(at));
    }
}
