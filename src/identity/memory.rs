use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    Account, IdentityError, IdentityStore, NewAccount, generate_uid,
    normalize_email,
};
use crate::crypto::PasswordManager;

/// Process-local identity store.
pub struct MemoryIdentityStore {
    pwd: PasswordManager,
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryIdentityStore {
    /// Create a new [`MemoryIdentityStore`].
    pub fn new(pwd: PasswordManager) -> Self {
        Self {
            pwd,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Find an account by id.
    pub async fn find_by_id(&self, id: &str) -> Option<Account> {
        self.accounts.read().await.get(id).cloned()
    }

    /// Find an account by email.
    pub async fn find_by_email(&self, email: &str) -> Option<Account> {
        let email = normalize_email(email);
        self.accounts
            .read()
            .await
            .values()
            .find(|account| account.email == email)
            .cloned()
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_account(
        &self,
        account: NewAccount,
    ) -> Result<String, IdentityError> {
        let email = normalize_email(&account.email);
        let password = self.pwd.hash_password(&account.password)?;

        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == email) {
            return Err(IdentityError::EmailAlreadyExists);
        }

        let id = generate_uid();
        accounts.insert(
            id.clone(),
            Account {
                id: id.clone(),
                email,
                password,
                email_verified: account.email_verified,
                created_at: Utc::now(),
            },
        );

        Ok(id)
    }

    async fn delete_account(&self, id: &str) -> Result<(), IdentityError> {
        match self.accounts.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound(id.to_owned())),
        }
    }
}
