use handyhub_shared::{ChangeEvent, ChangeKind, Table};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Fan-out of committed row changes to live subscribers
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishing with no subscribers is not an error
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn publish_row<T: Serialize>(&self, table: Table, kind: ChangeKind, row_id: Uuid, row: &T) {
        match serde_json::to_value(row) {
            Ok(record) => self.publish(ChangeEvent::new(table, kind, row_id, record)),
            Err(e) => tracing::error!("Failed to encode {} change for {}: {}", table.as_str(), row_id, e),
        }
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

/// Subscribe-by-table with optional column equality. `visible_if` narrows further:
/// when set, at least one of its column pairs must match.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    table: Option<Table>,
    column: Option<(String, String)>,
    visible_if: Vec<(String, String)>,
}

impl ChangeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn table(table: Table) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.column = Some((column.into(), value.to_string()));
        self
    }

    /// Row-level visibility: pass only records matching any of `pairs`
    pub fn visible_if<C, V>(mut self, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: ToString,
    {
        self.visible_if = pairs.into_iter().map(|(c, v)| (c.into(), v.to_string())).collect();
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.table.is_some_and(|t| t != event.table) {
            return false;
        }
        if !self.visible_if.is_empty()
            && !self.visible_if.iter().any(|(column, value)| event.column_equals(column, value))
        {
            return false;
        }
        match &self.column {
            Some((column, value)) => event.column_equals(column, value),
            None => true,
        }
    }
}

pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl ChangeSubscription {
    /// Next matching event. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Change subscriber lagged, skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
