use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::AppState;
use crate::caller::Caller;
use crate::error::Result;
use crate::provision::{ProvisionRequest, ProvisionResponse};

/// Handler to create a user on behalf of an administrator.
///
/// The body is only looked at once both gates passed.
pub async fn handler(
    State(state): State<AppState>,
    caller: Option<Caller>,
    body: std::result::Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Json<ProvisionResponse>> {
    let admin = state.provisioner.authorize(caller.as_ref()).await?;

    let Json(request) = body?;
    let response = state.provisioner.create(admin, request).await?;

    Ok(Json(response))
}
