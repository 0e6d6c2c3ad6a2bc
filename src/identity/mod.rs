//! Identity store port.
mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

use crate::crypto::CryptoError;

/// Length of generated account identifiers.
pub const UID_LENGTH: usize = 28;

/// Errors raised by an [`IdentityStore`].
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("the email address is already in use by another account")]
    EmailAlreadyExists,
    #[error("account {0} does not exist")]
    NotFound(String),
    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Account creation request.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub email_verified: bool,
}

/// Account as kept by the identity store.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Port for credentials and account identifiers.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create an account and return its id.
    async fn create_account(
        &self,
        account: NewAccount,
    ) -> Result<String, IdentityError>;

    /// Remove an account.
    async fn delete_account(&self, id: &str) -> Result<(), IdentityError>;
}

/// Generate a new account id.
pub fn generate_uid() -> String {
    Alphanumeric.sample_string(&mut OsRng, UID_LENGTH)
}

/// Emails are stored and compared lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}
