pub mod models;
pub mod pii;

pub use models::events::{ChangeEvent, ChangeKind, Table};
pub use pii::Masked;
