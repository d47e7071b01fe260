use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::availability::BlockingPolicy;
use crate::models::{Booking, BookingStatus, Notification, Provider, ProviderService, ProviderStatus, User};
use crate::slots::TimeSlot;

/// Failure reported by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Refresh,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

/// A one-time credential. Only the SHA-256 digest of the secret is stored.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub digest: String,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    pub status: Option<ProviderStatus>,
    pub category: Option<String>,
    pub city: Option<String>,
}

impl ProviderFilter {
    pub fn matches(&self, provider: &Provider) -> bool {
        self.status.map_or(true, |s| provider.status == s)
            && self
                .category
                .as_deref()
                .map_or(true, |c| provider.category.eq_ignore_ascii_case(c))
            && self
                .city
                .as_deref()
                .map_or(true, |c| provider.city.as_deref().is_some_and(|pc| pc.eq_ignore_ascii_case(c)))
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken
    async fn create_user(&self, user: &User) -> StoreResult<()>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn update_metadata(&self, id: Uuid, metadata: &serde_json::Value) -> StoreResult<User>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;

    async fn save_token(&self, token: &AuthToken) -> StoreResult<()>;

    /// Removes and returns the token, so each one can be used once
    async fn take_token(&self, digest: &str, purpose: TokenPurpose) -> StoreResult<Option<AuthToken>>;

    async fn revoke_tokens(&self, user_id: Uuid, purpose: TokenPurpose) -> StoreResult<()>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Fails with `Conflict` when the user already has a provider record
    async fn create_provider(&self, provider: &Provider) -> StoreResult<()>;

    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<Provider>>;

    async fn find_provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<Provider>>;

    async fn list_providers(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>>;

    async fn update_provider_status(&self, id: Uuid, status: ProviderStatus) -> StoreResult<Provider>;

    async fn update_provider_image(&self, id: Uuid, image_url: &str) -> StoreResult<Provider>;

    /// Bump the booking and earnings counters after a completed booking
    async fn record_completion(&self, id: Uuid, amount_cents: i32) -> StoreResult<()>;

    /// Fold one more rating into the running average
    async fn record_rating(&self, id: Uuid, rating: i16) -> StoreResult<()>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create_service(&self, service: &ProviderService) -> StoreResult<()>;

    async fn get_service(&self, id: Uuid) -> StoreResult<Option<ProviderService>>;

    async fn list_services(&self, provider_id: Uuid, only_available: bool) -> StoreResult<Vec<ProviderService>>;

    async fn update_service(&self, service: &ProviderService) -> StoreResult<()>;

    async fn delete_service(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a booking unless one with a blocking status already holds the same
    /// (provider, service, date, slot). The check and the write are one atomic step;
    /// a lost race surfaces as `Conflict`.
    async fn insert_booking(&self, booking: &Booking, policy: &BlockingPolicy) -> StoreResult<()>;

    /// Non-authoritative lookup of a blocking booking for one slot
    async fn find_slot_booking(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        slot: &TimeSlot,
        policy: &BlockingPolicy,
    ) -> StoreResult<Option<Booking>>;

    /// All bookings of one provider/service/date in the given statuses
    async fn list_day_bookings(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Newest first
    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Newest first
    async fn list_provider_bookings(&self, provider_id: Uuid, status: Option<BookingStatus>) -> StoreResult<Vec<Booking>>;

    /// Compare-and-set: fails with `Conflict` when the stored status is no longer `from`
    async fn update_booking_status(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Booking>;

    /// Fails with `Conflict` when the booking was already rated
    async fn record_rating(&self, id: Uuid, rating: i16, review: Option<&str>) -> StoreResult<Booking>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;

    /// Newest first, at most `limit` rows
    async fn list_recent(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<Notification>>;

    /// Fails with `NotFound` unless the notification belongs to `user_id`
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<Notification>;

    async fn mark_all_read(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Everything the services need from storage, passed in explicitly
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    /// All five contracts served by one in-memory store
    pub fn in_memory() -> Self {
        let store = Arc::new(crate::memory::InMemoryStore::new());
        Self {
            users: store.clone(),
            providers: store.clone(),
            services: store.clone(),
            bookings: store.clone(),
            notifications: store,
        }
    }
}
