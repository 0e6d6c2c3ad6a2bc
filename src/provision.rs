//! Admin-gated account provisioning.
//!
//! A provisioning call runs two gates (caller present, caller is `admin`)
//! before any write, then creates the identity account and its profile
//! document. The two stores are not transactional: when the profile cannot
//! be written the freshly created account is deleted again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::caller::Caller;
use crate::document::DocumentStore;
use crate::error::{Result, ServerError};
use crate::identity::{IdentityError, IdentityStore, NewAccount};
use crate::profile::{Role, USERS_COLLECTION, UserProfile, admin_write};

pub const SUCCESS_MESSAGE: &str = "User created successfully.";
const FAILURE_MESSAGE: &str = "Failed to create user";

/// Provisioning request body.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionRequest {
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[validate(length(min = 1, message = "First name is required."))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required."))]
    pub last_name: String,
    pub middle_name: Option<String>,
    pub passport_series_number: Option<String>,
    pub passport_issued_by: Option<String>,
    #[validate(length(min = 1, message = "Telephone is required."))]
    pub telephone: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub success: bool,
    pub uid: String,
    pub message: String,
}

/// Caller that passed both gates. Only [`Provisioner::authorize`] builds one.
#[derive(Clone, Copy, Debug)]
pub struct Admin<'a> {
    caller: &'a Caller,
}

impl Admin<'_> {
    pub fn uid(&self) -> &str {
        &self.caller.uid
    }
}

/// Creates accounts on behalf of administrators.
#[derive(Clone)]
pub struct Provisioner {
    identity: Arc<dyn IdentityStore>,
    documents: Arc<dyn DocumentStore>,
}

impl Provisioner {
    /// Create a new [`Provisioner`].
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            identity,
            documents,
        }
    }

    /// Run the whole workflow for `caller`.
    pub async fn provision(
        &self,
        caller: Option<&Caller>,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse> {
        let admin = self.authorize(caller).await?;
        self.create(admin, request).await
    }

    /// Authentication and authorization gates. Never writes.
    pub async fn authorize<'a>(&self, caller: Option<&'a Caller>) -> Result<Admin<'a>> {
        let Some(caller) = caller else {
            record("unauthenticated");
            return Err(ServerError::Unauthenticated);
        };

        let document = self
            .documents
            .get_document(USERS_COLLECTION, &caller.uid)
            .await
            .map_err(|err| {
                tracing::error!(caller = %caller.uid, error = %err, "role lookup failed");
                record("internal");
                ServerError::internal(FAILURE_MESSAGE, err)
            })?;

        match document.as_ref().and_then(Role::of) {
            Some(Role::Admin) => Ok(Admin { caller }),
            role => {
                tracing::warn!(caller = %caller.uid, ?role, "non-admin tried to create a user");
                record("permission_denied");
                Err(ServerError::PermissionDenied)
            },
        }
    }

    /// Create account and profile on behalf of `admin`.
    pub async fn create(
        &self,
        admin: Admin<'_>,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse> {
        if let Err(err) = request.validate() {
            record("invalid_argument");
            return Err(err.into());
        }

        match self.create_account_and_profile(request).await {
            Ok(uid) => {
                tracing::info!(user_id = %uid, admin = %admin.uid(), "user provisioned");
                record("created");
                Ok(ProvisionResponse {
                    success: true,
                    uid,
                    message: SUCCESS_MESSAGE.to_owned(),
                })
            },
            Err(err) => {
                tracing::error!(admin = %admin.uid(), error = %err, "failed to create user");
                record(match &err {
                    ServerError::AlreadyExists => "already_exists",
                    _ => "internal",
                });
                Err(err)
            },
        }
    }

    async fn create_account_and_profile(
        &self,
        request: ProvisionRequest,
    ) -> Result<String> {
        let uid = self
            .identity
            .create_account(NewAccount {
                email: request.email.clone(),
                password: request.password,
                email_verified: false,
            })
            .await
            .map_err(|err| match err {
                IdentityError::EmailAlreadyExists => ServerError::AlreadyExists,
                err => ServerError::internal(FAILURE_MESSAGE, err),
            })?;

        let profile = UserProfile::builder()
            .user_id(&uid)
            .name(request.first_name, request.last_name, request.middle_name)
            .passport(request.passport_series_number, request.passport_issued_by)
            .telephone(request.telephone)
            .email(&request.email)
            .build();

        if let Err(err) = self
            .documents
            .set_document(USERS_COLLECTION, &uid, profile.into_write())
            .await
        {
            self.rollback(&uid).await;
            return Err(ServerError::internal(FAILURE_MESSAGE, err));
        }

        Ok(uid)
    }

    /// Remove an account whose profile could not be written.
    async fn rollback(&self, uid: &str) {
        match self.identity.delete_account(uid).await {
            Ok(()) => tracing::warn!(user_id = %uid, "account removed after profile write failure"),
            Err(err) => tracing::error!(
                user_id = %uid,
                error = %err,
                "account left without profile"
            ),
        }
    }

    /// Give `uid` an admin profile unless it already has one.
    pub async fn ensure_admin(&self, uid: &str) -> Result<()> {
        let document = self
            .documents
            .get_document(USERS_COLLECTION, uid)
            .await
            .map_err(|err| ServerError::internal("Failed to read profile", err))?;

        if document.is_none() {
            self.documents
                .set_document(USERS_COLLECTION, uid, admin_write(uid))
                .await
                .map_err(|err| ServerError::internal("Failed to write profile", err))?;
            tracing::info!(user_id = %uid, "bootstrap admin profile created");
        }

        Ok(())
    }
}

fn record(outcome: &'static str) {
    metrics::counter!("users_provisioned_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tests::light;
    use crate::error::ErrorCode;
    use crate::document::{
        Document, DocumentError, DocumentWrite, MemoryDocumentStore,
    };
    use crate::identity::MemoryIdentityStore;
    use async_trait::async_trait;

    pub(crate) struct Fixture {
        pub provisioner: Provisioner,
        pub identity: Arc<MemoryIdentityStore>,
        pub documents: Arc<MemoryDocumentStore>,
    }

    /// Admin `A1` and plain user `U2` already exist.
    pub(crate) async fn fixture() -> Fixture {
        let identity = Arc::new(MemoryIdentityStore::new(light()));
        let documents = Arc::new(MemoryDocumentStore::new());
        let provisioner = Provisioner::new(identity.clone(), documents.clone());

        provisioner.ensure_admin("A1").await.unwrap();
        documents
            .set_document(
                USERS_COLLECTION,
                "U2",
                DocumentWrite::new().set("userId", "U2").set("role", "user"),
            )
            .await
            .unwrap();

        Fixture {
            provisioner,
            identity,
            documents,
        }
    }

    pub(crate) fn request(email: &str) -> ProvisionRequest {
        ProvisionRequest {
            email: email.into(),
            password: "p".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            telephone: "555".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_creates_user() {
        let f = fixture().await;
        let admin = Caller::new("A1");

        let response = f
            .provisioner
            .provision(Some(&admin), request("User@Example.com"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.message, SUCCESS_MESSAGE);

        assert_eq!(f.identity.len().await, 1);
        let account = f.identity.find_by_id(&response.uid).await.unwrap();
        assert!(!account.email_verified);

        let document = f
            .documents
            .get_document(USERS_COLLECTION, &response.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.get_str("userId"), Some(response.uid.as_str()));
        assert_eq!(document.get_str("email"), Some("user@example.com"));
        assert_eq!(document.get_str("role"), Some("user"));
        assert_eq!(document.get_bool("emailVerified"), Some(false));
        assert_eq!(document.get_str("firstName"), Some("Jane"));
        assert_eq!(document.get_str("middleName"), Some(""));
        assert_eq!(document.get_str("passportSeriesNumber"), Some(""));
        assert_eq!(document.get_str("telephone"), Some("555"));
        assert_eq!(
            document.get_timestamp("createdAt"),
            document.get_timestamp("updatedAt")
        );
        assert!(document.get_timestamp("createdAt").is_some());
        assert_eq!(f.documents.count(USERS_COLLECTION).await, 3);
    }

    #[tokio::test]
    async fn test_anonymous_caller() {
        let f = fixture().await;

        for _ in 0..3 {
            let err = f
                .provisioner
                .provision(None, request("user@example.com"))
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::Unauthenticated));
        }

        assert!(f.identity.is_empty().await);
        assert_eq!(f.documents.count(USERS_COLLECTION).await, 2);
    }

    #[tokio::test]
    async fn test_non_admin_caller() {
        let f = fixture().await;

        for uid in ["U2", "U2", "nobody"] {
            let err = f
                .provisioner
                .provision(Some(&Caller::new(uid)), request("user@example.com"))
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::PermissionDenied));
        }

        assert!(f.identity.is_empty().await);
        assert_eq!(f.documents.count(USERS_COLLECTION).await, 2);
    }

    #[tokio::test]
    async fn test_gates_run_before_validation() {
        let f = fixture().await;
        let empty = ProvisionRequest::default();

        let err = f.provisioner.provision(None, empty.clone()).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated));

        let err = f
            .provisioner
            .provision(Some(&Caller::new("U2")), empty.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied));

        let err = f
            .provisioner
            .provision(Some(&Caller::new("A1")), empty)
            .await
            .unwrap_err();
        let ServerError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields = errors.field_errors();
        assert_eq!(fields.len(), 5);
        assert!(fields.contains_key("telephone"));
        assert!(f.identity.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let f = fixture().await;
        let admin = Caller::new("A1");

        let first = f
            .provisioner
            .provision(Some(&admin), request("user@example.com"))
            .await
            .unwrap();

        let err = f
            .provisioner
            .provision(Some(&admin), request("User@Example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::AlreadyExists));

        assert_eq!(f.identity.len().await, 1);
        assert_eq!(f.documents.count(USERS_COLLECTION).await, 3);
        assert!(
            f.documents
                .get_document(USERS_COLLECTION, &first.uid)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_optional_fields_are_kept() {
        let f = fixture().await;
        let mut request = request("ivan@example.com");
        request.middle_name = Some("Petrovich".into());
        request.passport_series_number = Some("4510 123456".into());
        request.passport_issued_by = Some("Moscow".into());

        let response = f
            .provisioner
            .provision(Some(&Caller::new("A1")), request)
            .await
            .unwrap();
        let document = f
            .documents
            .get_document(USERS_COLLECTION, &response.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.get_str("middleName"), Some("Petrovich"));
        assert_eq!(document.get_str("passportSeriesNumber"), Some("4510 123456"));
        assert_eq!(document.get_str("passportIssuedBy"), Some("Moscow"));
    }

    #[tokio::test]
    async fn test_ensure_admin_keeps_existing_profile() {
        let f = fixture().await;

        f.provisioner.ensure_admin("U2").await.unwrap();
        let document = f
            .documents
            .get_document(USERS_COLLECTION, "U2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Role::of(&document), Some(Role::User));
    }

    /// Reads from memory, refuses every write.
    struct ReadOnlyStore(MemoryDocumentStore);

    #[async_trait]
    impl DocumentStore for ReadOnlyStore {
        async fn get_document(
            &self,
            collection: &str,
            id: &str,
        ) -> std::result::Result<Option<Document>, DocumentError> {
            self.0.get_document(collection, id).await
        }

        async fn set_document(
            &self,
            _collection: &str,
            _id: &str,
            _write: DocumentWrite,
        ) -> std::result::Result<(), DocumentError> {
            Err(DocumentError::Sql(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_profile_failure_removes_account() {
        let memory = MemoryDocumentStore::new();
        memory
            .set_document(USERS_COLLECTION, "A1", admin_write("A1"))
            .await
            .unwrap();
        let identity = Arc::new(MemoryIdentityStore::new(light()));
        let provisioner =
            Provisioner::new(identity.clone(), Arc::new(ReadOnlyStore(memory)));

        let err = provisioner
            .provision(Some(&Caller::new("A1")), request("user@example.com"))
            .await
            .unwrap_err();

        let ServerError::Internal { details, .. } = err else {
            panic!("expected internal error");
        };
        assert!(details.starts_with("Failed to create user: "));
        assert!(identity.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_runs_for_authorized_admin() {
        let f = fixture().await;
        let caller = Caller::new("A1");

        let admin = f.provisioner.authorize(Some(&caller)).await.unwrap();
        assert_eq!(admin.uid(), "A1");

        let response = f
            .provisioner
            .create(admin, request("user@example.com"))
            .await
            .unwrap();
        assert!(f.identity.find_by_id(&response.uid).await.is_some());
    }

    #[tokio::test]
    async fn test_account_and_profile_share_email() {
        let f = fixture().await;

        let response = f
            .provisioner
            .provision(Some(&Caller::new("A1")), request(" User@Example.com"))
            .await
            .unwrap();

        let account = f.identity.find_by_id(&response.uid).await.unwrap();
        let document = f
            .documents
            .get_document(USERS_COLLECTION, &response.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.email, " user@example.com");
        assert_eq!(document.get_str("email"), Some(account.email.as_str()));
    }

    /// Every read fails.
    struct UnreachableStore;

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn get_document(
            &self,
            _collection: &str,
            _id: &str,
        ) -> std::result::Result<Option<Document>, DocumentError> {
            Err(DocumentError::Sql(sqlx::Error::PoolTimedOut))
        }

        async fn set_document(
            &self,
            _collection: &str,
            _id: &str,
            _write: DocumentWrite,
        ) -> std::result::Result<(), DocumentError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_role_lookup_failure_is_internal() {
        let identity = Arc::new(MemoryIdentityStore::new(light()));
        let provisioner = Provisioner::new(identity.clone(), Arc::new(UnreachableStore));

        let err = provisioner
            .provision(Some(&Caller::new("A1")), request("user@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.to_string().starts_with("Failed to create user: "));
        assert!(identity.is_empty().await);
    }

    /// Creates accounts, refuses to delete them.
    struct UndeletableStore(MemoryIdentityStore);

    #[async_trait]
    impl IdentityStore for UndeletableStore {
        async fn create_account(
            &self,
            account: NewAccount,
        ) -> std::result::Result<String, IdentityError> {
            self.0.create_account(account).await
        }

        async fn delete_account(&self, _id: &str) -> std::result::Result<(), IdentityError> {
            Err(IdentityError::Sql(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_is_internal() {
        let memory = MemoryDocumentStore::new();
        memory
            .set_document(USERS_COLLECTION, "A1", admin_write("A1"))
            .await
            .unwrap();
        let identity = Arc::new(UndeletableStore(MemoryIdentityStore::new(light())));
        let provisioner =
            Provisioner::new(identity.clone(), Arc::new(ReadOnlyStore(memory)));

        let err = provisioner
            .provision(Some(&Caller::new("A1")), request("user@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(identity.0.len().await, 1);
    }
}
