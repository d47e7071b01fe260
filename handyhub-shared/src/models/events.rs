use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tables that publish row changes to subscribers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Providers,
    ProviderServices,
    Bookings,
    Notifications,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Providers => "providers",
            Table::ProviderServices => "provider_services",
            Table::Bookings => "bookings",
            Table::Notifications => "notifications",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "providers" => Some(Table::Providers),
            "provider_services" => Some(Table::ProviderServices),
            "bookings" => Some(Table::Bookings),
            "notifications" => Some(Table::Notifications),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed row change. `record` carries the row as it looks after the change
/// (or before it, for deletes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: Uuid,
    pub record: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, row_id: Uuid, record: serde_json::Value) -> Self {
        Self {
            table,
            kind,
            row_id,
            record,
            occurred_at: Utc::now(),
        }
    }

    /// Equality filter on a top-level column of the changed record.
    /// Strings compare as-is, everything else by its JSON rendering.
    pub fn column_equals(&self, column: &str, value: &str) -> bool {
        match self.record.get(column) {
            Some(serde_json::Value::String(s)) => s == value,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == value,
        }
    }
}
