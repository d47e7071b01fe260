use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use handyhub_core::{Provider, ProviderStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ProviderListQuery {
    status: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/providers", get(list_providers))
        .route("/admin/providers/{provider_id}/approve", post(approve))
        .route("/admin/providers/{provider_id}/reject", post(reject))
}

/// GET /admin/providers?status=pending
async fn list_providers(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(q): Query<ProviderListQuery>,
) -> Result<Json<Vec<Provider>>, AppError> {
    let status = match q.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            ProviderStatus::parse(raw)
                .ok_or_else(|| AppError::ValidationError(format!("unknown provider status '{}'", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.providers.list_for_admin(&me, status).await?))
}

async fn approve(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Provider>, AppError> {
    Ok(Json(state.providers.review(&me, provider_id, ProviderStatus::Approved).await?))
}

async fn reject(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Provider>, AppError> {
    Ok(Json(state.providers.review(&me, provider_id, ProviderStatus::Rejected).await?))
}
