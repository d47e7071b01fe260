pub mod availability;
pub mod booking;
pub mod identity;
pub mod media;
pub mod memory;
pub mod models;
pub mod notifications;
pub mod providers;
pub mod realtime;
pub mod repository;
pub mod roles;
pub mod slots;
pub mod storage;

pub use availability::{AvailabilityChecker, BlockingPolicy, SlotAvailability};
pub use booking::{BookingManager, CreateBookingRequest, SlotSelection};
pub use identity::{AuthOutcome, AuthService, LogMailer, Mailer};
pub use media::{MediaSettings, UploadSignature, UploadSigner};
pub use models::{Booking, BookingStatus, Identity, Notification, Provider, ProviderService, ProviderStatus, Role, User};
pub use notifications::{FeedPage, NotificationFeed, Notifier};
pub use providers::{ProviderApplication, ProviderManager, ServiceInput};
pub use realtime::{ChangeFeed, ChangeFilter, ChangeSubscription};
pub use repository::{Repositories, StoreError, StoreResult};
pub use roles::{capabilities, toggle_view, Capabilities, View, ViewToggle};
pub use slots::{BusinessHours, Slot, TimeSlot};
pub use storage::{MemoryObjectStore, ObjectStore};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Authentication required: {0}")]
    AuthenticationError(String),
    #[error("Permission denied: {0}")]
    PermissionError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Lookup failed: {0}")]
    LookupError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CoreError::NotFound(what),
            StoreError::Conflict(msg) => CoreError::ConflictError(msg),
            StoreError::Backend(e) => CoreError::LookupError(e.to_string()),
        }
    }
}
