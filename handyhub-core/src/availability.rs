use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, ProviderService};
use crate::repository::{BookingRepository, ServiceRepository};
use crate::slots::{generate_slots, BusinessHours, Slot, TimeSlot};
use crate::{CoreError, CoreResult};

/// Statuses that keep a slot occupied. `pending` is always part of the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingPolicy {
    statuses: Vec<BookingStatus>,
}

impl BlockingPolicy {
    pub fn new(statuses: impl IntoIterator<Item = BookingStatus>) -> CoreResult<Self> {
        let mut unique: Vec<BookingStatus> = Vec::new();
        for status in statuses {
            if !unique.contains(&status) {
                unique.push(status);
            }
        }

        if !unique.contains(&BookingStatus::Pending) {
            return Err(CoreError::ValidationError(
                "blocking statuses must include 'pending'".to_string(),
            ));
        }
        if let Some(terminal) = unique.iter().find(|s| s.is_terminal()) {
            return Err(CoreError::ValidationError(format!(
                "terminal status '{}' cannot block a slot",
                terminal
            )));
        }

        Ok(Self { statuses: unique })
    }

    /// Only pending requests hold a slot; accepted bookings free it again
    pub fn pending_only() -> Self {
        Self {
            statuses: vec![BookingStatus::Pending],
        }
    }

    /// Parse status names as they appear in configuration
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> CoreResult<Self> {
        let statuses = names
            .iter()
            .map(|name| {
                BookingStatus::parse(name.as_ref().trim()).ok_or_else(|| {
                    CoreError::ValidationError(format!("unknown booking status '{}'", name.as_ref()))
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(statuses)
    }

    pub fn statuses(&self) -> &[BookingStatus] {
        &self.statuses
    }

    pub fn blocks(&self, status: BookingStatus) -> bool {
        self.statuses.contains(&status)
    }
}

impl Default for BlockingPolicy {
    fn default() -> Self {
        Self {
            statuses: vec![BookingStatus::Pending, BookingStatus::Accepted],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: Slot,
    pub label: String,
    pub is_available: bool,
}

/// Mark each slot unavailable when a blocking booking sits on it
pub fn annotate(slots: &[Slot], bookings: &[Booking], policy: &BlockingPolicy) -> Vec<SlotAvailability> {
    let taken: HashSet<&TimeSlot> = bookings
        .iter()
        .filter(|b| policy.blocks(b.status))
        .map(|b| &b.time_slot)
        .collect();

    slots
        .iter()
        .map(|slot| SlotAvailability {
            slot: *slot,
            label: slot.to_string(),
            is_available: !taken.contains(&TimeSlot::Window(*slot)),
        })
        .collect()
}

pub fn parse_booking_date(raw: &str) -> CoreResult<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::ValidationError("date is required".to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CoreError::ValidationError(format!("'{}' is not a YYYY-MM-DD date", raw)))
}

/// Derives a day's slots for a service and flags the ones already taken
pub struct AvailabilityChecker {
    services: Arc<dyn ServiceRepository>,
    bookings: Arc<dyn BookingRepository>,
    hours: BusinessHours,
    policy: BlockingPolicy,
}

impl AvailabilityChecker {
    pub fn new(
        services: Arc<dyn ServiceRepository>,
        bookings: Arc<dyn BookingRepository>,
        hours: BusinessHours,
        policy: BlockingPolicy,
    ) -> Self {
        Self {
            services,
            bookings,
            hours,
            policy,
        }
    }

    pub fn hours(&self) -> &BusinessHours {
        &self.hours
    }

    pub fn policy(&self) -> &BlockingPolicy {
        &self.policy
    }

    pub async fn load_service(&self, provider_id: Uuid, service_id: Uuid) -> CoreResult<ProviderService> {
        let service = self
            .services
            .get_service(service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;

        if service.provider_id != provider_id {
            return Err(CoreError::ValidationError(format!(
                "service {} is not offered by provider {}",
                service_id, provider_id
            )));
        }
        Ok(service)
    }

    /// Slots of the service for `date`, each flagged with `is_available`.
    /// Any storage failure aborts the whole day with `LookupError`.
    pub async fn check(&self, provider_id: Uuid, service_id: Uuid, date: &str) -> CoreResult<Vec<SlotAvailability>> {
        let date = parse_booking_date(date)?;
        let service = self.load_service(provider_id, service_id).await?;
        let slots = generate_slots(service.duration_minutes as i64, &self.hours)?;

        let bookings = self
            .bookings
            .list_day_bookings(provider_id, service_id, date, self.policy.statuses())
            .await
            .map_err(|e| {
                tracing::warn!("Availability lookup failed for service {} on {}: {}", service_id, date, e);
                CoreError::LookupError(e.to_string())
            })?;

        let annotated = annotate(&slots, &bookings, &self.policy);
        tracing::debug!(
            "Availability for service {} on {}: {}/{} free",
            service_id,
            date,
            annotated.iter().filter(|s| s.is_available).count(),
            annotated.len()
        );
        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderService;
    use crate::repository::{Repositories, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::Utc;

    fn service(provider_id: Uuid, duration: i32) -> ProviderService {
        ProviderService {
            id: Uuid::new_v4(),
            provider_id,
            name: "Leak repair".to_string(),
            description: None,
            duration_minutes: duration,
            price_cents: 5000,
            is_available: true,
            created_at: Utc::now(),
        }
    }

    fn booking_at(svc: &ProviderService, date: NaiveDate, slot: &str, status: BookingStatus) -> Booking {
        let mut booking = Booking::new(
            Uuid::new_v4(),
            svc.provider_id,
            svc.id,
            date,
            slot.parse().unwrap(),
            svc.price_cents,
        );
        booking.status = status;
        booking
    }

    #[test]
    fn test_policy_requires_pending() {
        assert!(BlockingPolicy::new([BookingStatus::Accepted]).is_err());
        assert!(BlockingPolicy::new([BookingStatus::Pending, BookingStatus::Completed]).is_err());

        let policy = BlockingPolicy::from_names(&["pending", "accepted", "pending"]).unwrap();
        assert_eq!(policy, BlockingPolicy::default());
        assert!(BlockingPolicy::from_names(&["pending", "cancelled"]).is_err());
    }

    #[test]
    fn test_annotate_respects_policy() {
        let svc = service(Uuid::new_v4(), 60);
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let slots = generate_slots(60, &BusinessHours::default()).unwrap();
        let bookings = vec![
            booking_at(&svc, date, "09:00 - 10:00", BookingStatus::Pending),
            booking_at(&svc, date, "10:00 - 11:00", BookingStatus::Accepted),
            booking_at(&svc, date, "11:00 - 12:00", BookingStatus::Rejected),
        ];

        let strict = annotate(&slots, &bookings, &BlockingPolicy::default());
        assert!(!strict[0].is_available);
        assert!(!strict[1].is_available);
        assert!(strict[2].is_available);

        let legacy = annotate(&slots, &bookings, &BlockingPolicy::pending_only());
        assert!(!legacy[0].is_available);
        assert!(legacy[1].is_available);
        assert!(legacy[2].is_available);
    }

    #[tokio::test]
    async fn test_check_is_idempotent() {
        let repos = Repositories::in_memory();
        let svc = service(Uuid::new_v4(), 30);
        repos.services.create_service(&svc).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        repos
            .bookings
            .insert_booking(&booking_at(&svc, date, "09:30 - 10:00", BookingStatus::Pending), &BlockingPolicy::default())
            .await
            .unwrap();

        let checker = AvailabilityChecker::new(
            repos.services.clone(),
            repos.bookings.clone(),
            BusinessHours::default(),
            BlockingPolicy::default(),
        );

        let first = checker.check(svc.provider_id, svc.id, "2025-06-01").await.unwrap();
        let second = checker.check(svc.provider_id, svc.id, "2025-06-01").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert!(!first[1].is_available);
        assert_eq!(first.iter().filter(|s| s.is_available).count(), 15);

        let other_day = checker.check(svc.provider_id, svc.id, "2025-06-02").await.unwrap();
        assert!(other_day.iter().all(|s| s.is_available));
    }

    #[tokio::test]
    async fn test_check_validates_inputs() {
        let repos = Repositories::in_memory();
        let svc = service(Uuid::new_v4(), 60);
        repos.services.create_service(&svc).await.unwrap();
        let checker = AvailabilityChecker::new(
            repos.services.clone(),
            repos.bookings.clone(),
            BusinessHours::default(),
            BlockingPolicy::default(),
        );

        assert!(matches!(
            checker.check(svc.provider_id, svc.id, "").await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            checker.check(svc.provider_id, svc.id, "01/06/2025").await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            checker.check(Uuid::new_v4(), svc.id, "2025-06-01").await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            checker.check(svc.provider_id, Uuid::new_v4(), "2025-06-01").await,
            Err(CoreError::NotFound(_))
        ));
    }

    struct FailingBookings;

    #[async_trait]
    impl BookingRepository for FailingBookings {
        async fn insert_booking(&self, _: &Booking, _: &BlockingPolicy) -> StoreResult<()> {
            Err(StoreError::backend(std::io::Error::other("connection reset")))
        }
        async fn find_slot_booking(
            &self,
            _: Uuid,
            _: Uuid,
            _: NaiveDate,
            _: &TimeSlot,
            _: &BlockingPolicy,
        ) -> StoreResult<Option<Booking>> {
            Err(StoreError::backend(std::io::Error::other("connection reset")))
        }
        async fn list_day_bookings(&self, _: Uuid, _: Uuid, _: NaiveDate, _: &[BookingStatus]) -> StoreResult<Vec<Booking>> {
            Err(StoreError::backend(std::io::Error::other("connection reset")))
        }
        async fn get_booking(&self, _: Uuid) -> StoreResult<Option<Booking>> {
            Ok(None)
        }
        async fn list_user_bookings(&self, _: Uuid) -> StoreResult<Vec<Booking>> {
            Ok(vec![])
        }
        async fn list_provider_bookings(&self, _: Uuid, _: Option<BookingStatus>) -> StoreResult<Vec<Booking>> {
            Ok(vec![])
        }
        async fn update_booking_status(&self, id: Uuid, _: BookingStatus, _: BookingStatus) -> StoreResult<Booking> {
            Err(StoreError::NotFound(format!("booking {}", id)))
        }
        async fn record_rating(&self, id: Uuid, _: i16, _: Option<&str>) -> StoreResult<Booking> {
            Err(StoreError::NotFound(format!("booking {}", id)))
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_day() {
        let repos = Repositories::in_memory();
        let svc = service(Uuid::new_v4(), 60);
        repos.services.create_service(&svc).await.unwrap();
        let checker = AvailabilityChecker::new(
            repos.services.clone(),
            Arc::new(FailingBookings),
            BusinessHours::default(),
            BlockingPolicy::default(),
        );

        let result = checker.check(svc.provider_id, svc.id, "2025-06-01").await;
        assert!(matches!(result, Err(CoreError::LookupError(_))));
    }
}
