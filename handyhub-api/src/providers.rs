use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use handyhub_core::providers::MAX_IMAGE_BYTES;
use handyhub_core::{Provider, ProviderApplication, ProviderService, ServiceInput, SlotAvailability};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{CurrentUser, MaybeUser};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotsQuery {
    #[serde(default)]
    date: String,
}

#[derive(Debug, Serialize)]
struct SlotsResponse {
    provider_id: Uuid,
    service_id: Uuid,
    date: String,
    slots: Vec<SlotAvailability>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/providers", get(list_providers).post(apply))
        .route("/providers/me", get(my_provider))
        .route("/providers/{provider_id}", get(get_provider))
        .route("/providers/{provider_id}/services", get(list_services).post(add_service))
        .route("/providers/{provider_id}/services/{service_id}/slots", get(slots))
        .route(
            "/providers/{provider_id}/image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1)),
        )
        .route("/services/{service_id}", put(update_service).delete(delete_service))
}

async fn list_providers(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Result<Json<Vec<Provider>>, AppError> {
    Ok(Json(state.providers.list_public(q.category, q.city).await?))
}

async fn apply(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<ProviderApplication>,
) -> Result<(StatusCode, Json<Provider>), AppError> {
    let provider = state.providers.apply(&me, req).await?;
    Ok((StatusCode::CREATED, Json(provider)))
}

async fn my_provider(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<Json<Provider>, AppError> {
    state
        .providers
        .my_provider(&me)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError("no provider application for this account".to_string()))
}

async fn get_provider(
    State(state): State<AppState>,
    MaybeUser(me): MaybeUser,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Provider>, AppError> {
    Ok(Json(state.providers.get(me.as_ref(), provider_id).await?))
}

async fn list_services(
    State(state): State<AppState>,
    MaybeUser(me): MaybeUser,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Vec<ProviderService>>, AppError> {
    Ok(Json(state.providers.list_services(me.as_ref(), provider_id).await?))
}

async fn add_service(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(provider_id): Path<Uuid>,
    Json(req): Json<ServiceInput>,
) -> Result<(StatusCode, Json<ProviderService>), AppError> {
    let service = state.providers.add_service(&me, provider_id, req).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(service_id): Path<Uuid>,
    Json(req): Json<ServiceInput>,
) -> Result<Json<ProviderService>, AppError> {
    Ok(Json(state.providers.update_service(&me, service_id, req).await?))
}

async fn delete_service(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(service_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.providers.delete_service(&me, service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn slots(
    State(state): State<AppState>,
    Path((provider_id, service_id)): Path<(Uuid, Uuid)>,
    Query(q): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let slots = state.bookings.check_availability(provider_id, service_id, &q.date).await?;
    Ok(Json(SlotsResponse {
        provider_id,
        service_id,
        date: q.date,
        slots,
    }))
}

async fn upload_image(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(provider_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Provider>, AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::ValidationError("Content-Type header is required".to_string()))?;

    let provider = state
        .providers
        .upload_image(&me, provider_id, content_type, body.to_vec())
        .await?;
    Ok(Json(provider))
}
