use handyhub_shared::{ChangeEvent, ChangeKind, Table};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Identity, Notification};
use crate::realtime::{ChangeFeed, ChangeFilter, ChangeSubscription};
use crate::repository::NotificationRepository;
use crate::CoreResult;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Writes notifications and announces them on the change feed
#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
    feed: ChangeFeed,
}

impl Notifier {
    pub fn new(repo: Arc<dyn NotificationRepository>, feed: ChangeFeed) -> Self {
        Self { repo, feed }
    }

    pub async fn notify(&self, notification: Notification) -> CoreResult<Notification> {
        self.repo.insert_notification(&notification).await?;
        self.feed
            .publish_row(Table::Notifications, ChangeKind::Insert, notification.id, &notification);
        tracing::debug!("Notified user {} ({})", notification.user_id, notification.kind);
        Ok(notification)
    }

    /// For side effects of an already committed change: failures are logged, not returned
    pub async fn notify_quietly(&self, notification: Notification) {
        let user_id = notification.user_id;
        if let Err(e) = self.notify(notification).await {
            tracing::error!("Failed to deliver notification to user {}: {}", user_id, e);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub notifications: Vec<Notification>,
    /// Unread rows within this page only
    pub unread_count: usize,
}

/// The signed-in user's view over their notifications
#[derive(Clone)]
pub struct NotificationFeed {
    repo: Arc<dyn NotificationRepository>,
    feed: ChangeFeed,
    page_size: i64,
}

impl NotificationFeed {
    pub fn new(repo: Arc<dyn NotificationRepository>, feed: ChangeFeed, page_size: i64) -> Self {
        Self {
            repo,
            feed,
            page_size: if page_size > 0 { page_size } else { DEFAULT_PAGE_SIZE },
        }
    }

    pub async fn recent(&self, identity: &Identity) -> CoreResult<FeedPage> {
        let notifications = self.repo.list_recent(identity.user_id, self.page_size).await?;
        let unread_count = notifications.iter().filter(|n| !n.read).count();
        Ok(FeedPage {
            notifications,
            unread_count,
        })
    }

    pub async fn mark_read(&self, identity: &Identity, id: Uuid) -> CoreResult<Notification> {
        let notification = self.repo.mark_read(identity.user_id, id).await?;
        self.feed
            .publish_row(Table::Notifications, ChangeKind::Update, notification.id, &notification);
        Ok(notification)
    }

    pub async fn mark_all_read(&self, identity: &Identity) -> CoreResult<u64> {
        let updated = self.repo.mark_all_read(identity.user_id).await?;
        tracing::debug!("Marked {} notifications read for {}", updated, identity.user_id);
        if updated > 0 {
            // One user-scoped update; row_id is the user since many rows changed
            self.feed.publish(ChangeEvent::new(
                Table::Notifications,
                ChangeKind::Update,
                identity.user_id,
                serde_json::json!({ "user_id": identity.user_id, "read": true, "updated": updated }),
            ));
        }
        Ok(updated)
    }

    /// Live changes to this user's notifications
    pub fn subscribe(&self, identity: &Identity) -> ChangeSubscription {
        self.feed
            .subscribe(ChangeFilter::table(Table::Notifications).eq("user_id", identity.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repository::Repositories;
    use crate::CoreError;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "sam@example.com".to_string(),
            role: Role::Customer,
        }
    }

    fn setup() -> (Notifier, NotificationFeed) {
        let repos = Repositories::in_memory();
        let feed = ChangeFeed::default();
        (
            Notifier::new(repos.notifications.clone(), feed.clone()),
            NotificationFeed::new(repos.notifications, feed, DEFAULT_PAGE_SIZE),
        )
    }

    #[tokio::test]
    async fn test_page_is_bounded_and_newest_first() {
        let (notifier, feed) = setup();
        let me = identity();

        for i in 0..12 {
            let mut n = Notification::new(me.user_id, "booking", format!("#{}", i), "hello");
            n.created_at += chrono::Duration::seconds(i);
            notifier.notify(n).await.unwrap();
        }

        let page = feed.recent(&me).await.unwrap();
        assert_eq!(page.notifications.len(), 10);
        assert_eq!(page.notifications[0].title, "#11");
        assert_eq!(page.notifications[9].title, "#2");
        // Unread count only covers the fetched page
        assert_eq!(page.unread_count, 10);
    }

    #[tokio::test]
    async fn test_mark_read_is_owner_only() {
        let (notifier, feed) = setup();
        let me = identity();
        let other = identity();

        let n = notifier.notify(Notification::new(me.user_id, "booking", "t", "m")).await.unwrap();

        assert!(matches!(feed.mark_read(&other, n.id).await, Err(CoreError::NotFound(_))));
        assert!(feed.mark_read(&me, n.id).await.unwrap().read);
        assert_eq!(feed.recent(&me).await.unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let (notifier, feed) = setup();
        let me = identity();
        for _ in 0..3 {
            notifier.notify(Notification::new(me.user_id, "system", "t", "m")).await.unwrap();
        }

        let mut sub = feed.subscribe(&me);
        assert_eq!(feed.mark_all_read(&me).await.unwrap(), 3);
        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.record["updated"], 3);

        assert_eq!(feed.mark_all_read(&me).await.unwrap(), 0);
        let quiet = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_subscription_sees_only_own_inserts() {
        let (notifier, feed) = setup();
        let me = identity();
        let mut sub = feed.subscribe(&me);

        notifier.notify(Notification::new(Uuid::new_v4(), "system", "not mine", "m")).await.unwrap();
        let mine = notifier.notify(Notification::new(me.user_id, "system", "mine", "m")).await.unwrap();

        let event = sub.next().await.unwrap();
        assert_eq!(event.row_id, mine.id);
    }
}
