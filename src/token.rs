//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::{Error, ErrorKind};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUDIENCE: &str = "provisioner";
pub const EXPIRATION_TIME: u64 = 60 * 60; // 1 hour.

type Result<T> = std::result::Result<T, Error>;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Subject (user ID).
    pub sub: String,
}

/// Verify caller tokens (and mint them when a private key is known).
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    public_key: DecodingKey,
    private_key: Option<EncodingKey>,
    issuer: String,
    audience: String,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(
        issuer: &str,
        public_key_pem: &str,
        private_key_pem: Option<&str>,
    ) -> Result<Self> {
        let public_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())?;
        let private_key = private_key_pem
            .map(|pem| EncodingKey::from_ec_pem(pem.as_bytes()))
            .transpose()?;

        Ok(Self {
            algorithm: Algorithm::ES256,
            public_key,
            private_key,
            issuer: issuer.to_owned(),
            audience: DEFAULT_AUDIENCE.to_string(),
        })
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Create a new [`jsonwebtoken`] for `user_id`.
    pub fn create(&self, user_id: &str) -> Result<String> {
        let Some(private_key) = &self.private_key else {
            return Err(ErrorKind::InvalidEcdsaKey.into());
        };

        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + EXPIRATION_TIME,
            iat: time,
            iss: self.issuer.clone(),
            sub: user_id.to_owned(),
        };

        encode(&Header::new(self.algorithm), &claims, private_key)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        Ok(decode::<Claims>(token, &self.public_key, &validation)?.claims)
    }
}
