use axum::{extract::State, routing::post, Json, Router};
use handyhub_core::{UploadSignature, UploadSigner};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct SignatureRequest {
    provider_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/uploads/signature", post(sign_upload))
}

/// Short-lived parameters for a direct upload into the provider's own folder.
/// The media secret never leaves the server.
async fn sign_upload(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<SignatureRequest>,
) -> Result<Json<UploadSignature>, AppError> {
    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::UnavailableError("media uploads are not configured".to_string()))?;

    let provider = state.providers.owned_provider(&me, req.provider_id).await?;
    let signature = signer.sign(&UploadSigner::provider_folder(provider.id))?;
    tracing::debug!("Signed upload for provider {}", provider.id);
    Ok(Json(signature))
}
