//! Caller identity attached to an invocation.

use axum::extract::OptionalFromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::AppState;
use crate::error::ServerError;

const BEARER: &str = "Bearer ";

/// Authenticated subject of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
}

impl Caller {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// No `Authorization` header means an anonymous caller. A header that does
/// not carry a valid token is rejected.
impl OptionalFromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER))
            .ok_or(ServerError::Unauthenticated)?;

        match state.token.decode(token.trim()) {
            Ok(claims) if !claims.sub.is_empty() => {
                Ok(Some(Caller::new(claims.sub)))
            },
            Ok(_) => Err(ServerError::Unauthenticated),
            Err(err) => {
                tracing::debug!(error = %err, "caller token rejected");
                Err(ServerError::Unauthenticated)
            },
        }
    }
}
