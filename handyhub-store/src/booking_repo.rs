use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use handyhub_core::models::{Booking, BookingStatus};
use handyhub_core::repository::BookingRepository;
use handyhub_core::{BlockingPolicy, StoreError, StoreResult, TimeSlot};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::database::{corrupt, store_error};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(found.is_some())
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    provider_id: Uuid,
    service_id: Uuid,
    booking_date: NaiveDate,
    time_slot: String,
    status: String,
    amount_cents: i32,
    notes: Option<String>,
    rating: Option<i16>,
    review: Option<String>,
    is_rated: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            status: BookingStatus::parse(&row.status).ok_or_else(|| corrupt("booking status", &row.status))?,
            time_slot: row
                .time_slot
                .parse::<TimeSlot>()
                .map_err(|_| corrupt("time slot", &row.time_slot))?,
            id: row.id,
            user_id: row.user_id,
            provider_id: row.provider_id,
            service_id: row.service_id,
            booking_date: row.booking_date,
            amount_cents: row.amount_cents,
            notes: row.notes,
            rating: row.rating,
            review: row.review,
            is_rated: row.is_rated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, user_id, provider_id, service_id, booking_date, time_slot, status, amount_cents, \
     notes, rating, review, is_rated, created_at, updated_at";

fn status_names(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn collect(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(&self, booking: &Booking, policy: &BlockingPolicy) -> StoreResult<()> {
        let slot = booking.time_slot.to_string();
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Serialize writers on the same slot; the partial unique index backs up the pending case
        let lock_key = format!(
            "{}:{}:{}:{}",
            booking.provider_id, booking.service_id, booking.booking_date, slot
        );
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, provider_id, service_id, booking_date, time_slot, status,
                                  amount_cents, notes, is_rated, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            WHERE NOT EXISTS (
                SELECT 1 FROM bookings
                WHERE provider_id = $3 AND service_id = $4 AND booking_date = $5 AND time_slot = $6
                  AND status = ANY($13)
            )
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.provider_id)
        .bind(booking.service_id)
        .bind(booking.booking_date)
        .bind(&slot)
        .bind(booking.status.as_str())
        .bind(booking.amount_cents)
        .bind(&booking.notes)
        .bind(booking.is_rated)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(status_names(policy.statuses()))
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            debug!("Slot {} on {} already held", slot, booking.booking_date);
            return Err(StoreError::Conflict(format!(
                "slot {} on {} is no longer available",
                slot, booking.booking_date
            )));
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn find_slot_booking(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        slot: &TimeSlot,
        policy: &BlockingPolicy,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE provider_id = $1 AND service_id = $2 AND booking_date = $3 AND time_slot = $4
              AND status = ANY($5)
            LIMIT 1
            "#,
            BOOKING_COLUMNS
        ))
        .bind(provider_id)
        .bind(service_id)
        .bind(date)
        .bind(slot.to_string())
        .bind(status_names(policy.statuses()))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_day_bookings(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE provider_id = $1 AND service_id = $2 AND booking_date = $3 AND status = ANY($4)
            "#,
            BOOKING_COLUMNS
        ))
        .bind(provider_id)
        .bind(service_id)
        .bind(date)
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        collect(rows)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        collect(rows)
    }

    async fn list_provider_bookings(&self, provider_id: Uuid, status: Option<BookingStatus>) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE provider_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
            BOOKING_COLUMNS
        ))
        .bind(provider_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        collect(rows)
    }

    async fn update_booking_status(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Booking> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => Booking::try_from(row),
            None if self.exists(id).await? => Err(StoreError::Conflict(format!(
                "booking {} is no longer {}",
                id, from
            ))),
            None => Err(StoreError::NotFound(format!("booking {}", id))),
        }
    }

    async fn record_rating(&self, id: Uuid, rating: i16, review: Option<&str>) -> StoreResult<Booking> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings SET rating = $2, review = $3, is_rated = TRUE, updated_at = NOW()
            WHERE id = $1 AND NOT is_rated
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(rating)
        .bind(review)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => Booking::try_from(row),
            None if self.exists(id).await? => {
                Err(StoreError::Conflict(format!("booking {} has already been rated", id)))
            }
            None => Err(StoreError::NotFound(format!("booking {}", id))),
        }
    }
}
