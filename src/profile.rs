//! Profile records stored next to identity accounts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentWrite, server_timestamp};
use crate::identity::normalize_email;

/// Collection holding one profile per account.
pub const USERS_COLLECTION: &str = "users";

/// Platform role of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Role written on a profile document, if any.
    pub fn of(document: &Document) -> Option<Self> {
        document.get_str("role").and_then(|role| role.parse().ok())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

/// Profile of a freshly provisioned account.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub passport_series_number: String,
    pub passport_issued_by: String,
    pub telephone: String,
    pub email: String,
}

impl UserProfile {
    /// Create a new [`ProfileBuilder`].
    pub fn builder() -> ProfileBuilder<Missing> {
        ProfileBuilder::new()
    }

    /// Document written for this profile.
    ///
    /// New profiles are always unverified `user`s, timestamps are assigned by
    /// the store.
    pub fn into_write(self) -> DocumentWrite {
        DocumentWrite::new()
            .set("userId", self.user_id)
            .set("firstName", self.first_name)
            .set("lastName", self.last_name)
            .set("middleName", self.middle_name)
            .set("passportSeriesNumber", self.passport_series_number)
            .set("passportIssuedBy", self.passport_issued_by)
            .set("telephone", self.telephone)
            .set("email", self.email)
            .set("emailVerified", false)
            .set("role", Role::User.as_str())
            .set("createdAt", server_timestamp())
            .set("updatedAt", server_timestamp())
    }
}

/// Minimal profile granting `admin` to `user_id`.
pub fn admin_write(user_id: &str) -> DocumentWrite {
    DocumentWrite::new()
        .set("userId", user_id)
        .set("role", Role::Admin.as_str())
        .set("emailVerified", false)
        .set("createdAt", server_timestamp())
        .set("updatedAt", server_timestamp())
}

/// Value is missing on [`ProfileBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`ProfileBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

/// [`UserProfile`] builder. Only buildable once the account id is known.
#[derive(Debug, Clone)]
pub struct ProfileBuilder<Id> {
    id: Id,
    profile: UserProfile,
}

impl ProfileBuilder<Missing> {
    pub fn new() -> Self {
        Self {
            id: Missing,
            profile: UserProfile::default(),
        }
    }

    /// Update `user_id` field on [`ProfileBuilder`].
    pub fn user_id(self, id: impl Into<String>) -> ProfileBuilder<Present<String>> {
        ProfileBuilder {
            id: Present(id.into()),
            profile: self.profile,
        }
    }
}

impl Default for ProfileBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> ProfileBuilder<Id> {
    /// Update name fields. A missing middle name is stored empty.
    pub fn name(
        mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        middle_name: Option<String>,
    ) -> Self {
        self.profile.first_name = first_name.into();
        self.profile.last_name = last_name.into();
        self.profile.middle_name = middle_name.unwrap_or_default();
        self
    }

    /// Update passport fields. Missing values are stored empty.
    pub fn passport(
        mut self,
        series_number: Option<String>,
        issued_by: Option<String>,
    ) -> Self {
        self.profile.passport_series_number = series_number.unwrap_or_default();
        self.profile.passport_issued_by = issued_by.unwrap_or_default();
        self
    }

    /// Update `telephone` field.
    pub fn telephone(mut self, telephone: impl Into<String>) -> Self {
        self.profile.telephone = telephone.into();
        self
    }

    /// Update `email` field, normalized like identity accounts.
    pub fn email(mut self, email: &str) -> Self {
        self.profile.email = normalize_email(email);
        self
    }
}

impl ProfileBuilder<Present<String>> {
    /// Build the [`UserProfile`].
    pub fn build(self) -> UserProfile {
        UserProfile {
            user_id: self.id.0,
            ..self.profile
        }
    }
}
