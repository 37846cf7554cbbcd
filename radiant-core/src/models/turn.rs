use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored exchange. `sequence` is assigned by the store and is the only
/// replay order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Turn {
    pub sequence: i64,
    pub user_text: String,
    pub ai_text: String,
    pub created_at: DateTime<Utc>,
}
