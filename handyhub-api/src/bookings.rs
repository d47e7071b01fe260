use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use handyhub_core::{Booking, BookingStatus, CoreError, CreateBookingRequest};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{CurrentUser, MaybeUser};
use crate::metrics::{record_booking_attempt, record_transition};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ProviderBookingsQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    rating: i16,
    #[serde(default)]
    review: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(my_bookings).post(create_booking))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/accept", post(accept))
        .route("/bookings/{booking_id}/reject", post(reject))
        .route("/bookings/{booking_id}/complete", post(complete))
        .route("/bookings/{booking_id}/rating", post(rate))
        .route("/provider/bookings", get(provider_bookings))
}

/// Anonymous callers reach the manager so the refusal comes from the booking rules
async fn create_booking(
    State(state): State<AppState>,
    MaybeUser(me): MaybeUser,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    match state.bookings.create_booking(me.as_ref(), req).await {
        Ok(booking) => {
            record_booking_attempt("created");
            info!("Booking {} committed", booking.id);
            Ok((StatusCode::CREATED, Json(booking)))
        }
        Err(e) => {
            record_booking_attempt(match e {
                CoreError::ConflictError(_) => "conflict",
                _ => "rejected",
            });
            Err(e.into())
        }
    }
}

async fn my_bookings(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_customer(&me).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(&me, booking_id).await?))
}

async fn provider_bookings(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(q): Query<ProviderBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let status = match q.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::ValidationError(format!("unknown booking status '{}'", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.bookings.list_for_provider(&me, status).await?))
}

async fn transition(state: &AppState, me: &handyhub_core::Identity, booking_id: Uuid, next: BookingStatus) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.update_status(me, booking_id, next).await?;
    record_transition(next.as_str());
    Ok(Json(booking))
}

async fn accept(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    transition(&state, &me, booking_id, BookingStatus::Accepted).await
}

async fn reject(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    transition(&state, &me, booking_id, BookingStatus::Rejected).await
}

async fn complete(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    transition(&state, &me, booking_id, BookingStatus::Completed).await
}

async fn rate(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<RatingRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(
        state
            .bookings
            .rate_booking(&me, booking_id, req.rating, req.review)
            .await?,
    ))
}
