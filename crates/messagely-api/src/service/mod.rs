pub mod accounts;
pub mod messages;

use chrono::{DateTime, Utc};

use messagely_db::models::{PartyRow, parse_timestamp};
use messagely_types::models::UserSummary;

use crate::error::ApiError;

fn summary(row: PartyRow) -> UserSummary {
    UserSummary {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
    }
}

/// Stored timestamps are written by us, so a parse failure means a corrupt row.
fn timestamp(raw: &str, what: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_timestamp(raw)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt {} '{}': {}", what, raw, e)))
}

fn optional_timestamp(raw: Option<&str>, what: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    raw.map(|raw| timestamp(raw, what)).transpose()
}
