//! Utility functions for the backend service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique fetch ID for log correlation
pub fn generate_fetch_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds elapsed since `since`, clamped at zero
pub fn seconds_since(since: DateTime<Utc>) -> u64 {
    (current_timestamp() - since).num_seconds().max(0) as u64
}
