use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{
    IdentityError, IdentityStore, NewAccount, generate_uid, normalize_email,
};
use crate::crypto::PasswordManager;

/// Unique constraint on `accounts.email`.
const EMAIL_CONSTRAINT: &str = "accounts_email_key";

/// Identity store backed by the `accounts` table.
#[derive(Clone)]
pub struct PostgresIdentityStore {
    pool: Pool<Postgres>,
    pwd: PasswordManager,
}

impl PostgresIdentityStore {
    /// Create a new [`PostgresIdentityStore`].
    pub fn new(pool: Pool<Postgres>, pwd: PasswordManager) -> Self {
        Self { pool, pwd }
    }
}

fn is_email_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| {
        e.is_unique_violation() && e.constraint() == Some(EMAIL_CONSTRAINT)
    })
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn create_account(
        &self,
        account: NewAccount,
    ) -> Result<String, IdentityError> {
        let email = normalize_email(&account.email);
        let password = self.pwd.hash_password(&account.password)?;
        let id = generate_uid();

        sqlx::query(
            r#"INSERT INTO accounts (id, email, password, email_verified)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&password)
        .bind(account.email_verified)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_email_conflict(&err) {
                IdentityError::EmailAlreadyExists
            } else {
                IdentityError::Sql(err)
            }
        })?;

        tracing::debug!(user_id = %id, "account inserted");
        Ok(id)
    }

    async fn delete_account(&self, id: &str) -> Result<(), IdentityError> {
        let result = sqlx::query(r#"DELETE FROM accounts WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_error_is_not_conflict() {
        assert!(!is_email_conflict(&sqlx::Error::RowNotFound));
        assert!(!is_email_conflict(&sqlx::Error::PoolTimedOut));
    }
}
