use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::availability::BlockingPolicy;
use crate::models::{Booking, BookingStatus, Notification, Provider, ProviderService, ProviderStatus, User};
use crate::repository::{
    AuthToken, BookingRepository, NotificationRepository, ProviderFilter, ProviderRepository, ServiceRepository,
    StoreError, StoreResult, TokenPurpose, UserRepository,
};
use crate::slots::TimeSlot;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, AuthToken>,
    providers: HashMap<Uuid, Provider>,
    services: HashMap<Uuid, ProviderService>,
    bookings: HashMap<Uuid, Booking>,
    notifications: HashMap<Uuid, Notification>,
}

/// Process-local implementation of every repository contract.
/// Used for tests and for running the API without Postgres.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} is already registered", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn update_metadata(&self, id: Uuid, metadata: &serde_json::Value) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.metadata = metadata.clone();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn save_token(&self, token: &AuthToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.tokens.insert(token.digest.clone(), token.clone());
        Ok(())
    }

    async fn take_token(&self, digest: &str, purpose: TokenPurpose) -> StoreResult<Option<AuthToken>> {
        let mut tables = self.tables.write().await;
        match tables.tokens.get(digest) {
            Some(token) if token.purpose == purpose => Ok(tables.tokens.remove(digest)),
            _ => Ok(None),
        }
    }

    async fn revoke_tokens(&self, user_id: Uuid, purpose: TokenPurpose) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .tokens
            .retain(|_, t| !(t.user_id == user_id && t.purpose == purpose));
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for InMemoryStore {
    async fn create_provider(&self, provider: &Provider) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.providers.values().any(|p| p.user_id == provider.user_id) {
            return Err(StoreError::Conflict("a provider application already exists for this user".to_string()));
        }
        tables.providers.insert(provider.id, provider.clone());
        Ok(())
    }

    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<Provider>> {
        Ok(self.tables.read().await.providers.get(&id).cloned())
    }

    async fn find_provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<Provider>> {
        let tables = self.tables.read().await;
        Ok(tables.providers.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn list_providers(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>> {
        let tables = self.tables.read().await;
        let mut providers: Vec<Provider> = tables.providers.values().filter(|p| filter.matches(p)).cloned().collect();
        providers.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.business_name.cmp(&b.business_name))
        });
        Ok(providers)
    }

    async fn update_provider_status(&self, id: Uuid, status: ProviderStatus) -> StoreResult<Provider> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        provider.status = status;
        provider.updated_at = Utc::now();
        Ok(provider.clone())
    }

    async fn update_provider_image(&self, id: Uuid, image_url: &str) -> StoreResult<Provider> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        provider.image_url = Some(image_url.to_string());
        provider.updated_at = Utc::now();
        Ok(provider.clone())
    }

    async fn record_completion(&self, id: Uuid, amount_cents: i32) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        provider.total_bookings += 1;
        provider.total_earnings_cents += amount_cents as i64;
        provider.updated_at = Utc::now();
        Ok(())
    }

    async fn record_rating(&self, id: Uuid, rating: i16) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        provider.rating = provider.rating_with(rating);
        provider.rating_count += 1;
        provider.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryStore {
    async fn create_service(&self, service: &ProviderService) -> StoreResult<()> {
        self.tables.write().await.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> StoreResult<Option<ProviderService>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn list_services(&self, provider_id: Uuid, only_available: bool) -> StoreResult<Vec<ProviderService>> {
        let tables = self.tables.read().await;
        let mut services: Vec<ProviderService> = tables
            .services
            .values()
            .filter(|s| s.provider_id == provider_id && (!only_available || s.is_available))
            .cloned()
            .collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(services)
    }

    async fn update_service(&self, service: &ProviderService) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.services.get_mut(&service.id) {
            Some(existing) => {
                *existing = service.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("service {}", service.id))),
        }
    }

    async fn delete_service(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .services
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("service {}", id)))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_booking(&self, booking: &Booking, policy: &BlockingPolicy) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let taken = tables.bookings.values().any(|b| {
            policy.blocks(b.status)
                && b.occupies(booking.provider_id, booking.service_id, booking.booking_date, &booking.time_slot)
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "slot {} on {} is no longer available",
                booking.time_slot, booking.booking_date
            )));
        }
        tables.bookings.insert(booking.id, booking.clone());
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
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| policy.blocks(b.status) && b.occupies(provider_id, service_id, date, slot))
            .cloned())
    }

    async fn list_day_bookings(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| {
                b.provider_id == provider_id
                    && b.service_id == service_id
                    && b.booking_date == date
                    && statuses.contains(&b.status)
            })
            .cloned()
            .collect())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let rows = tables.bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
        Ok(newest_first(rows, |b: &Booking| b.created_at))
    }

    async fn list_provider_bookings(&self, provider_id: Uuid, status: Option<BookingStatus>) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let rows = tables
            .bookings
            .values()
            .filter(|b| b.provider_id == provider_id && status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |b: &Booking| b.created_at))
    }

    async fn update_booking_status(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Booking> {
        let mut tables = self.tables.write().await;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;
        if booking.status != from {
            return Err(StoreError::Conflict(format!(
                "booking {} is {}, expected {}",
                id, booking.status, from
            )));
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn record_rating(&self, id: Uuid, rating: i16, review: Option<&str>) -> StoreResult<Booking> {
        let mut tables = self.tables.write().await;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;
        if booking.is_rated {
            return Err(StoreError::Conflict(format!("booking {} has already been rated", id)));
        }
        booking.rating = Some(rating);
        booking.review = review.map(str::to_string);
        booking.is_rated = true;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn list_recent(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        let rows = tables.notifications.values().filter(|n| n.user_id == user_id).cloned().collect();
        let mut rows = newest_first(rows, |n: &Notification| n.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<Notification> {
        let mut tables = self.tables.write().await;
        match tables.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id => {
                n.read = true;
                Ok(n.clone())
            }
            _ => Err(StoreError::NotFound(format!("notification {}", id))),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for n in tables.notifications.values_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pending_booking(provider_id: Uuid, service_id: Uuid) -> Booking {
        Booking::new(
            Uuid::new_v4(),
            provider_id,
            service_id,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            "09:00 - 10:00".parse().unwrap(),
            4000,
        )
    }

    #[tokio::test]
    async fn test_concurrent_inserts_admit_one() {
        let store = Arc::new(InMemoryStore::new());
        let provider_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_booking(&pending_booking(provider_id, service_id), &BlockingPolicy::default())
                    .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(store.tables.read().await.bookings.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_booking_frees_slot() {
        let store = InMemoryStore::new();
        let first = pending_booking(Uuid::new_v4(), Uuid::new_v4());
        store.insert_booking(&first, &BlockingPolicy::default()).await.unwrap();
        store
            .update_booking_status(first.id, BookingStatus::Pending, BookingStatus::Rejected)
            .await
            .unwrap();

        let mut second = pending_booking(first.provider_id, first.service_id);
        second.user_id = Uuid::new_v4();
        store.insert_booking(&second, &BlockingPolicy::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let store = InMemoryStore::new();
        let booking = pending_booking(Uuid::new_v4(), Uuid::new_v4());
        store.insert_booking(&booking, &BlockingPolicy::default()).await.unwrap();

        store
            .update_booking_status(booking.id, BookingStatus::Pending, BookingStatus::Accepted)
            .await
            .unwrap();
        let stale = store
            .update_booking_status(booking.id, BookingStatus::Pending, BookingStatus::Rejected)
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_tokens_are_single_use() {
        let store = InMemoryStore::new();
        let token = AuthToken {
            digest: "abc".to_string(),
            user_id: Uuid::new_v4(),
            purpose: TokenPurpose::Refresh,
            expires_at: Utc::now(),
        };
        store.save_token(&token).await.unwrap();

        assert!(store.take_token("abc", TokenPurpose::PasswordReset).await.unwrap().is_none());
        assert!(store.take_token("abc", TokenPurpose::Refresh).await.unwrap().is_some());
        assert!(store.take_token("abc", TokenPurpose::Refresh).await.unwrap().is_none());
    }
}
