use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is locked. Try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Email is already registered")]
    EmailTaken,
}

/// Token verification failure.
///
/// A single variant covers expired, forged, and structurally corrupt
/// tokens: the caller's required action (re-authenticate) is the same
/// for all three, and distinguishing them would hand an oracle to an
/// attacker probing the verifier.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl Error {
    /// True for failures that map to an unauthenticated response.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::InvalidCredentials) | Error::Token(TokenError::Invalid)
        )
    }

    /// True for failures that map to a forbidden response.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::AccountLocked { .. }) | Error::Auth(AuthError::AccountDisabled)
        )
    }
}
