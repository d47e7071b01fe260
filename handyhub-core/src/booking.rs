use handyhub_shared::{ChangeKind, Table};
use serde::Deserialize;
use uuid::Uuid;

use crate::availability::{parse_booking_date, AvailabilityChecker, BlockingPolicy, SlotAvailability};
use crate::models::{Booking, BookingStatus, Identity, Notification, Provider};
use crate::notifications::Notifier;
use crate::realtime::ChangeFeed;
use crate::repository::Repositories;
use crate::slots::{generate_slots, parse_time, BusinessHours, Slot, TimeSlot};
use crate::{CoreError, CoreResult};

/// Coarse part-of-day labels accepted instead of an exact window
pub const COARSE_LABELS: [&str; 3] = ["Morning", "Afternoon", "Evening"];

/// The slot picked in the booking form
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SlotSelection {
    Window { start: String, end: String },
    Label { label: String },
}

impl SlotSelection {
    fn into_time_slot(self) -> CoreResult<TimeSlot> {
        match self {
            SlotSelection::Window { start, end } => {
                if start.trim().is_empty() || end.trim().is_empty() {
                    return Err(CoreError::ValidationError("time slot is required".to_string()));
                }
                let (start, end) = (parse_time(&start)?, parse_time(&end)?);
                if start >= end {
                    return Err(CoreError::ValidationError("time slot must end after it starts".to_string()));
                }
                Ok(TimeSlot::Window(Slot { start, end }))
            }
            SlotSelection::Label { label } => {
                let label = label.trim();
                if label.is_empty() {
                    return Err(CoreError::ValidationError("time slot is required".to_string()));
                }
                COARSE_LABELS
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(label))
                    .map(|known| TimeSlot::Label(known.to_string()))
                    .ok_or_else(|| CoreError::ValidationError(format!("unknown time slot '{}'", label)))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub date: String,
    pub slot: SlotSelection,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Creates bookings and drives them through their lifecycle
pub struct BookingManager {
    repos: Repositories,
    checker: AvailabilityChecker,
    notifier: Notifier,
    feed: ChangeFeed,
}

impl BookingManager {
    pub fn new(repos: Repositories, feed: ChangeFeed, hours: BusinessHours, policy: BlockingPolicy) -> Self {
        let checker = AvailabilityChecker::new(repos.services.clone(), repos.bookings.clone(), hours, policy);
        let notifier = Notifier::new(repos.notifications.clone(), feed.clone());
        Self {
            repos,
            checker,
            notifier,
            feed,
        }
    }

    pub fn availability(&self) -> &AvailabilityChecker {
        &self.checker
    }

    pub async fn check_availability(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: &str,
    ) -> CoreResult<Vec<SlotAvailability>> {
        self.checker.check(provider_id, service_id, date).await
    }

    /// Reserve a slot for the signed-in customer.
    ///
    /// The lookup before the insert only produces a friendlier error early; the
    /// storage insert itself decides whether the slot is still free.
    pub async fn create_booking(&self, identity: Option<&Identity>, request: CreateBookingRequest) -> CoreResult<Booking> {
        let identity =
            identity.ok_or_else(|| CoreError::AuthenticationError("sign in to book a service".to_string()))?;

        let date = parse_booking_date(&request.date)?;
        let time_slot = request.slot.into_time_slot()?;

        let service = self.checker.load_service(request.provider_id, request.service_id).await?;
        if !service.is_available {
            return Err(CoreError::ValidationError(format!("service {} is not currently offered", service.id)));
        }

        let provider = self.provider(request.provider_id).await?;
        if !provider.is_approved() {
            return Err(CoreError::ValidationError(format!(
                "provider {} is not accepting bookings",
                provider.id
            )));
        }
        if provider.user_id == identity.user_id {
            return Err(CoreError::ValidationError("providers cannot book their own services".to_string()));
        }

        if let TimeSlot::Window(window) = &time_slot {
            let offered = generate_slots(service.duration_minutes as i64, self.checker.hours())?;
            if !offered.contains(window) {
                return Err(CoreError::ValidationError(format!(
                    "{} is not a bookable slot for this service",
                    window
                )));
            }
        }

        let policy = self.checker.policy();
        let existing = self
            .repos
            .bookings
            .find_slot_booking(provider.id, service.id, date, &time_slot, policy)
            .await
            .map_err(|e| CoreError::LookupError(e.to_string()))?;
        if existing.is_some() {
            return Err(CoreError::ConflictError(format!(
                "slot {} on {} is no longer available",
                time_slot, date
            )));
        }

        let mut booking = Booking::new(identity.user_id, provider.id, service.id, date, time_slot, service.price_cents);
        booking.notes = request.notes.filter(|n| !n.trim().is_empty());

        self.repos.bookings.insert_booking(&booking, policy).await.map_err(|e| {
            tracing::info!("Booking insert rejected for {} {}: {}", date, booking.time_slot, e);
            CoreError::from(e)
        })?;

        tracing::info!(
            "Booking {} created by {} for service {} on {} at {}",
            booking.id,
            identity.user_id,
            service.id,
            date,
            booking.time_slot
        );

        self.feed.publish_row(Table::Bookings, ChangeKind::Insert, booking.id, &booking);
        self.notifier
            .notify_quietly(
                Notification::new(
                    provider.user_id,
                    "booking",
                    "New booking request",
                    format!("{} requested on {} at {}", service.name, date, booking.time_slot),
                )
                .with_link("/provider/bookings"),
            )
            .await;

        Ok(booking)
    }

    /// Provider-side status change, restricted to the owner of the booked provider
    pub async fn update_status(&self, identity: &Identity, booking_id: Uuid, next: BookingStatus) -> CoreResult<Booking> {
        let booking = self.booking(booking_id).await?;
        let provider = self.provider(booking.provider_id).await?;
        if provider.user_id != identity.user_id {
            return Err(CoreError::PermissionError(
                "only the provider can change this booking".to_string(),
            ));
        }
        if !booking.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: next.to_string(),
            });
        }

        let updated = self
            .repos
            .bookings
            .update_booking_status(booking.id, booking.status, next)
            .await?;

        if next == BookingStatus::Completed {
            if let Err(e) = self
                .repos
                .providers
                .record_completion(provider.id, updated.amount_cents)
                .await
            {
                tracing::error!("Failed to update counters for provider {}: {}", provider.id, e);
            }
        }

        tracing::info!("Booking {} moved {} -> {}", updated.id, booking.status, next);
        self.feed.publish_row(Table::Bookings, ChangeKind::Update, updated.id, &updated);

        let (title, message) = match next {
            BookingStatus::Accepted => ("Booking accepted", format!("{} accepted your booking", provider.business_name)),
            BookingStatus::Rejected => ("Booking declined", format!("{} declined your booking", provider.business_name)),
            BookingStatus::Completed => ("Booking completed", "Your booking is complete. Leave a rating!".to_string()),
            BookingStatus::Pending => ("Booking updated", "Your booking was updated".to_string()),
        };
        self.notifier
            .notify_quietly(Notification::new(updated.user_id, "booking", title, message).with_link("/bookings"))
            .await;

        Ok(updated)
    }

    pub async fn accept(&self, identity: &Identity, booking_id: Uuid) -> CoreResult<Booking> {
        self.update_status(identity, booking_id, BookingStatus::Accepted).await
    }

    pub async fn reject(&self, identity: &Identity, booking_id: Uuid) -> CoreResult<Booking> {
        self.update_status(identity, booking_id, BookingStatus::Rejected).await
    }

    pub async fn complete(&self, identity: &Identity, booking_id: Uuid) -> CoreResult<Booking> {
        self.update_status(identity, booking_id, BookingStatus::Completed).await
    }

    /// One rating per completed booking, by the customer who made it
    pub async fn rate_booking(
        &self,
        identity: &Identity,
        booking_id: Uuid,
        rating: i16,
        review: Option<String>,
    ) -> CoreResult<Booking> {
        if !(1..=5).contains(&rating) {
            return Err(CoreError::ValidationError("rating must be between 1 and 5".to_string()));
        }
        let booking = self.booking(booking_id).await?;
        if booking.user_id != identity.user_id {
            return Err(CoreError::PermissionError("only the customer can rate this booking".to_string()));
        }
        if booking.status != BookingStatus::Completed {
            return Err(CoreError::ValidationError("only completed bookings can be rated".to_string()));
        }
        if booking.is_rated {
            return Err(CoreError::ConflictError("booking has already been rated".to_string()));
        }

        let review = review.filter(|r| !r.trim().is_empty());
        let rated = self
            .repos
            .bookings
            .record_rating(booking.id, rating, review.as_deref())
            .await?;

        if let Err(e) = self.repos.providers.record_rating(rated.provider_id, rating).await {
            tracing::error!("Failed to fold rating into provider {}: {}", rated.provider_id, e);
        }
        self.feed.publish_row(Table::Bookings, ChangeKind::Update, rated.id, &rated);

        if let Ok(provider) = self.provider(rated.provider_id).await {
            self.notifier
                .notify_quietly(
                    Notification::new(
                        provider.user_id,
                        "review",
                        "New rating",
                        format!("A customer rated your service {}/5", rating),
                    )
                    .with_link("/provider/bookings"),
                )
                .await;
        }

        Ok(rated)
    }

    /// Visible to the customer, the provider owner and admins
    pub async fn get_booking(&self, identity: &Identity, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.booking(booking_id).await?;
        if booking.user_id == identity.user_id || identity.is_admin() {
            return Ok(booking);
        }
        let provider = self.provider(booking.provider_id).await?;
        if provider.user_id == identity.user_id {
            return Ok(booking);
        }
        Err(CoreError::PermissionError("not your booking".to_string()))
    }

    pub async fn list_for_customer(&self, identity: &Identity) -> CoreResult<Vec<Booking>> {
        Ok(self.repos.bookings.list_user_bookings(identity.user_id).await?)
    }

    pub async fn list_for_provider(&self, identity: &Identity, status: Option<BookingStatus>) -> CoreResult<Vec<Booking>> {
        let provider = self
            .repos
            .providers
            .find_provider_by_user(identity.user_id)
            .await?
            .ok_or_else(|| CoreError::PermissionError("no provider account for this user".to_string()))?;
        Ok(self.repos.bookings.list_provider_bookings(provider.id, status).await?)
    }

    async fn booking(&self, id: Uuid) -> CoreResult<Booking> {
        self.repos
            .bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", id)))
    }

    async fn provider(&self, id: Uuid) -> CoreResult<Provider> {
        self.repos
            .providers
            .get_provider(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("provider {}", id)))
    }
}
