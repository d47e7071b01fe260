use chrono::Utc;
use handyhub_shared::{ChangeKind, Table};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Identity, Notification, Provider, ProviderService, ProviderStatus};
use crate::notifications::Notifier;
use crate::realtime::ChangeFeed;
use crate::repository::{ProviderFilter, Repositories};
use crate::roles::require_admin;
use crate::slots::parse_duration;
use crate::storage::{image_extension, provider_image_path, ObjectStore};
use crate::{CoreError, CoreResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderApplication {
    pub business_name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Durations arrive either as a number or as free text ("45 min")
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Minutes(i64),
    Text(String),
}

impl DurationInput {
    fn minutes(&self) -> CoreResult<i32> {
        match self {
            DurationInput::Minutes(m) => parse_duration(&m.to_string()),
            DurationInput::Text(raw) => parse_duration(raw),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration: DurationInput,
    pub price_cents: i32,
    #[serde(default)]
    pub is_available: Option<bool>,
}

impl ServiceInput {
    fn validate(&self) -> CoreResult<i32> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError("service name is required".to_string()));
        }
        if self.price_cents < 0 {
            return Err(CoreError::ValidationError("price cannot be negative".to_string()));
        }
        self.duration.minutes()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Provider accounts, their services and their images
pub struct ProviderManager {
    repos: Repositories,
    notifier: Notifier,
    feed: ChangeFeed,
    objects: Arc<dyn ObjectStore>,
}

impl ProviderManager {
    pub fn new(repos: Repositories, feed: ChangeFeed, objects: Arc<dyn ObjectStore>) -> Self {
        let notifier = Notifier::new(repos.notifications.clone(), feed.clone());
        Self {
            repos,
            notifier,
            feed,
            objects,
        }
    }

    /// Submit a provider application. Each user gets one provider record.
    pub async fn apply(&self, identity: &Identity, application: ProviderApplication) -> CoreResult<Provider> {
        let business_name = application.business_name.trim();
        let category = application.category.trim();
        if business_name.is_empty() || category.is_empty() {
            return Err(CoreError::ValidationError("business name and category are required".to_string()));
        }

        let mut provider = Provider::new(identity.user_id, business_name.to_string(), category.to_lowercase());
        provider.description = non_empty(application.description);
        provider.city = non_empty(application.city);
        provider.phone = non_empty(application.phone);

        self.repos.providers.create_provider(&provider).await?;
        tracing::info!("Provider application {} submitted by {}", provider.id, identity.user_id);

        self.feed
            .publish_row(Table::Providers, ChangeKind::Insert, provider.id, &provider);
        self.notifier
            .notify_quietly(
                Notification::new(
                    identity.user_id,
                    "provider",
                    "Application received",
                    format!("We are reviewing {}", provider.business_name),
                )
                .with_link("/become-provider"),
            )
            .await;
        Ok(provider)
    }

    /// Admin approval or rejection of a pending application
    pub async fn review(&self, identity: &Identity, provider_id: Uuid, decision: ProviderStatus) -> CoreResult<Provider> {
        require_admin(identity)?;
        if decision == ProviderStatus::Pending {
            return Err(CoreError::ValidationError("decision must be approved or rejected".to_string()));
        }

        let provider = self.provider(provider_id).await?;
        if provider.status == decision {
            return Ok(provider);
        }
        let updated = self.repos.providers.update_provider_status(provider.id, decision).await?;
        tracing::info!("Provider {} {} by admin {}", updated.id, decision.as_str(), identity.user_id);

        self.feed
            .publish_row(Table::Providers, ChangeKind::Update, updated.id, &updated);
        let (title, message, link) = match decision {
            ProviderStatus::Approved => (
                "Application approved",
                format!("{} is now live. Add your services to start taking bookings.", updated.business_name),
                "/provider/dashboard",
            ),
            _ => (
                "Application rejected",
                format!("Your application for {} was not approved.", updated.business_name),
                "/become-provider",
            ),
        };
        self.notifier
            .notify_quietly(Notification::new(updated.user_id, "provider", title, message).with_link(link))
            .await;
        Ok(updated)
    }

    /// Approved providers are public; others only to their owner and admins
    pub async fn get(&self, identity: Option<&Identity>, provider_id: Uuid) -> CoreResult<Provider> {
        let provider = self.provider(provider_id).await?;
        let visible = provider.is_approved()
            || identity.is_some_and(|i| i.is_admin() || i.user_id == provider.user_id);
        if !visible {
            return Err(CoreError::NotFound(format!("provider {}", provider_id)));
        }
        Ok(provider)
    }

    pub async fn list_public(&self, category: Option<String>, city: Option<String>) -> CoreResult<Vec<Provider>> {
        let filter = ProviderFilter {
            status: Some(ProviderStatus::Approved),
            category: non_empty(category),
            city: non_empty(city),
        };
        Ok(self.repos.providers.list_providers(&filter).await?)
    }

    pub async fn list_for_admin(&self, identity: &Identity, status: Option<ProviderStatus>) -> CoreResult<Vec<Provider>> {
        require_admin(identity)?;
        let filter = ProviderFilter {
            status,
            ..Default::default()
        };
        Ok(self.repos.providers.list_providers(&filter).await?)
    }

    pub async fn my_provider(&self, identity: &Identity) -> CoreResult<Option<Provider>> {
        Ok(self.repos.providers.find_provider_by_user(identity.user_id).await?)
    }

    /// The provider, if `identity` owns it and it has been approved
    pub async fn owned_provider(&self, identity: &Identity, provider_id: Uuid) -> CoreResult<Provider> {
        let provider = self.provider(provider_id).await?;
        if provider.user_id != identity.user_id {
            return Err(CoreError::PermissionError("you do not manage this provider".to_string()));
        }
        if !provider.is_approved() {
            return Err(CoreError::PermissionError("provider is not approved yet".to_string()));
        }
        Ok(provider)
    }

    pub async fn add_service(&self, identity: &Identity, provider_id: Uuid, input: ServiceInput) -> CoreResult<ProviderService> {
        let provider = self.owned_provider(identity, provider_id).await?;
        let duration_minutes = input.validate()?;

        let service = ProviderService {
            id: Uuid::new_v4(),
            provider_id: provider.id,
            name: input.name.trim().to_string(),
            description: non_empty(input.description),
            duration_minutes,
            price_cents: input.price_cents,
            is_available: input.is_available.unwrap_or(true),
            created_at: Utc::now(),
        };
        self.repos.services.create_service(&service).await?;
        tracing::info!("Service {} added to provider {}", service.id, provider.id);

        self.feed
            .publish_row(Table::ProviderServices, ChangeKind::Insert, service.id, &service);
        Ok(service)
    }

    pub async fn update_service(&self, identity: &Identity, service_id: Uuid, input: ServiceInput) -> CoreResult<ProviderService> {
        let existing = self.service(service_id).await?;
        self.owned_provider(identity, existing.provider_id).await?;
        let duration_minutes = input.validate()?;

        let service = ProviderService {
            name: input.name.trim().to_string(),
            description: non_empty(input.description),
            duration_minutes,
            price_cents: input.price_cents,
            is_available: input.is_available.unwrap_or(existing.is_available),
            ..existing
        };
        self.repos.services.update_service(&service).await?;

        self.feed
            .publish_row(Table::ProviderServices, ChangeKind::Update, service.id, &service);
        Ok(service)
    }

    pub async fn delete_service(&self, identity: &Identity, service_id: Uuid) -> CoreResult<()> {
        let existing = self.service(service_id).await?;
        self.owned_provider(identity, existing.provider_id).await?;
        self.repos.services.delete_service(service_id).await?;
        tracing::info!("Service {} removed from provider {}", service_id, existing.provider_id);

        self.feed
            .publish_row(Table::ProviderServices, ChangeKind::Delete, existing.id, &existing);
        Ok(())
    }

    /// Everyone sees available services; the owner also sees hidden ones
    pub async fn list_services(&self, identity: Option<&Identity>, provider_id: Uuid) -> CoreResult<Vec<ProviderService>> {
        let provider = self.get(identity, provider_id).await?;
        let is_owner = identity.is_some_and(|i| i.user_id == provider.user_id);
        Ok(self.repos.services.list_services(provider.id, !is_owner).await?)
    }

    pub async fn upload_image(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CoreResult<Provider> {
        let provider = self.owned_provider(identity, provider_id).await?;
        let extension = image_extension(content_type)?;
        if bytes.is_empty() {
            return Err(CoreError::ValidationError("image is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(CoreError::ValidationError(format!(
                "image exceeds {} bytes",
                MAX_IMAGE_BYTES
            )));
        }

        let path = provider_image_path(provider.id, extension);
        let url = self.objects.put(&path, bytes, content_type).await?;
        let updated = self.repos.providers.update_provider_image(provider.id, &url).await?;
        tracing::info!("Stored image {} for provider {}", path, provider.id);

        self.feed
            .publish_row(Table::Providers, ChangeKind::Update, updated.id, &updated);
        Ok(updated)
    }

    async fn provider(&self, id: Uuid) -> CoreResult<Provider> {
        self.repos
            .providers
            .get_provider(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("provider {}", id)))
    }

    async fn service(&self, id: Uuid) -> CoreResult<ProviderService> {
        self.repos
            .services
            .get_service(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::storage::MemoryObjectStore;

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "lee@example.com".to_string(),
            role,
        }
    }

    fn manager() -> (Repositories, ProviderManager) {
        let repos = Repositories::in_memory();
        let objects = Arc::new(MemoryObjectStore::new("http://cdn.test"));
        let manager = ProviderManager::new(repos.clone(), ChangeFeed::default(), objects);
        (repos, manager)
    }

    fn application(name: &str) -> ProviderApplication {
        ProviderApplication {
            business_name: name.to_string(),
            category: "Plumbing".to_string(),
            description: Some("  ".to_string()),
            city: Some("Austin".to_string()),
            phone: None,
        }
    }

    fn service_input(duration: DurationInput) -> ServiceInput {
        ServiceInput {
            name: "Drain cleaning".to_string(),
            description: None,
            duration,
            price_cents: 9000,
            is_available: None,
        }
    }

    async fn approved(manager: &ProviderManager, owner: &Identity) -> Provider {
        let provider = manager.apply(owner, application("Pipe Pros")).await.unwrap();
        manager
            .review(&identity(Role::Admin), provider.id, ProviderStatus::Approved)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_application_per_user() {
        let (_, manager) = manager();
        let me = identity(Role::Customer);

        let provider = manager.apply(&me, application("Pipe Pros")).await.unwrap();
        assert_eq!(provider.status, ProviderStatus::Pending);
        assert_eq!(provider.category, "plumbing");
        assert_eq!(provider.description, None);

        let again = manager.apply(&me, application("Pipe Pros 2")).await;
        assert!(matches!(again, Err(CoreError::ConflictError(_))));
    }

    #[tokio::test]
    async fn test_review_requires_admin_and_notifies() {
        let (repos, manager) = manager();
        let me = identity(Role::Customer);
        let provider = manager.apply(&me, application("Pipe Pros")).await.unwrap();

        assert!(matches!(
            manager.review(&me, provider.id, ProviderStatus::Approved).await,
            Err(CoreError::PermissionError(_))
        ));

        let admin = identity(Role::Admin);
        let approved = manager.review(&admin, provider.id, ProviderStatus::Approved).await.unwrap();
        assert!(approved.is_approved());

        let inbox = repos.notifications.list_recent(me.user_id, 10).await.unwrap();
        assert_eq!(inbox[0].title, "Application approved");
    }

    #[tokio::test]
    async fn test_public_listing_shows_approved_only() {
        let (_, manager) = manager();
        let a = identity(Role::Customer);
        let b = identity(Role::Customer);
        let live = approved(&manager, &a).await;
        let pending = manager.apply(&b, application("Drip Doctors")).await.unwrap();

        let listed = manager.list_public(Some("PLUMBING".into()), Some("austin".into())).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, live.id);
        assert!(manager.list_public(None, Some("Dallas".into())).await.unwrap().is_empty());

        assert!(matches!(manager.get(None, pending.id).await, Err(CoreError::NotFound(_))));
        assert!(manager.get(Some(&b), pending.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_service_writes_need_approved_owner() {
        let (_, manager) = manager();
        let owner = identity(Role::Customer);
        let pending = manager.apply(&owner, application("Pipe Pros")).await.unwrap();

        let early = manager
            .add_service(&owner, pending.id, service_input(DurationInput::Minutes(60)))
            .await;
        assert!(matches!(early, Err(CoreError::PermissionError(_))));

        let provider = manager
            .review(&identity(Role::Admin), pending.id, ProviderStatus::Approved)
            .await
            .unwrap();
        let service = manager
            .add_service(&owner, provider.id, service_input(DurationInput::Text("45 min".into())))
            .await
            .unwrap();
        assert_eq!(service.duration_minutes, 45);

        let stranger = identity(Role::Customer);
        assert!(matches!(
            manager.delete_service(&stranger, service.id).await,
            Err(CoreError::PermissionError(_))
        ));

        let bad = manager
            .add_service(&owner, provider.id, service_input(DurationInput::Minutes(0)))
            .await;
        assert!(matches!(bad, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_hidden_services_visible_to_owner_only() {
        let (_, manager) = manager();
        let owner = identity(Role::Customer);
        let provider = approved(&manager, &owner).await;

        let service = manager
            .add_service(&owner, provider.id, service_input(DurationInput::Minutes(60)))
            .await
            .unwrap();
        let mut hide = service_input(DurationInput::Minutes(60));
        hide.is_available = Some(false);
        manager.update_service(&owner, service.id, hide).await.unwrap();

        assert!(manager.list_services(None, provider.id).await.unwrap().is_empty());
        assert_eq!(manager.list_services(Some(&owner), provider.id).await.unwrap().len(), 1);

        manager.delete_service(&owner, service.id).await.unwrap();
        assert!(manager.list_services(Some(&owner), provider.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_image_upload() {
        let (_, manager) = manager();
        let owner = identity(Role::Customer);
        let provider = approved(&manager, &owner).await;

        let updated = manager
            .upload_image(&owner, provider.id, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
            .await
            .unwrap();
        let url = updated.image_url.unwrap();
        assert!(url.starts_with(&format!("http://cdn.test/providers/{}/", provider.id)));
        assert!(url.ends_with(".png"));

        let gif = manager.upload_image(&owner, provider.id, "image/gif", vec![1]).await;
        assert!(matches!(gif, Err(CoreError::ValidationError(_))));
        let other = manager
            .upload_image(&identity(Role::Customer), provider.id, "image/png", vec![1])
            .await;
        assert!(matches!(other, Err(CoreError::PermissionError(_))));
    }
}
