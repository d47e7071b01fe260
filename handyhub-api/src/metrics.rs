//! Prometheus counters for booking traffic.

use axum::{http::header::CONTENT_TYPE, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

use crate::error::AppError;

/// Booking attempts by outcome: created, conflict, rejected
static BOOKING_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "handyhub_booking_attempts_total",
        "Booking creation attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to register handyhub_booking_attempts_total metric")
});

static BOOKING_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "handyhub_booking_transitions_total",
        "Booking status changes by target status",
        &["status"]
    )
    .expect("Failed to register handyhub_booking_transitions_total metric")
});

pub fn record_booking_attempt(outcome: &str) {
    BOOKING_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_transition(status: &str) {
    BOOKING_TRANSITIONS.with_label_values(&[status]).inc();
}

pub async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    Lazy::force(&BOOKING_ATTEMPTS);
    Lazy::force(&BOOKING_TRANSITIONS);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| AppError::InternalServerError(format!("encode metrics: {}", e)))?;

    Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], buffer))
}
