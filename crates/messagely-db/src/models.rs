//! Database row types — these map directly to SQLite rows.
//! Distinct from messagely-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub joined_at: String,
    pub last_login_at: String,
}

/// Fields for a new `users` row. The password is already hashed.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
}

/// Public columns of a user, as pulled in by message joins.
pub struct PartyRow {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

pub struct MessageRow {
    pub id: i64,
    pub from_username: String,
    pub to_username: String,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
}

/// A message joined with both participants.
pub struct MessageDetailRow {
    pub id: i64,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
    pub from_user: PartyRow,
    pub to_user: PartyRow,
}

/// A message joined with the other participant (recipient for an outbox,
/// sender for an inbox).
pub struct MailboxRow {
    pub id: i64,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
    pub other: PartyRow,
}

/// Timestamps are written as RFC 3339 UTC with microseconds.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 as well as SQLite's `datetime('now')` format, which has no
/// timezone and is read as UTC.
pub fn parse_timestamp(raw: &str) -> chrono::ParseResult<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_both_timestamp_formats() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(ts)).unwrap(), ts);
        assert_eq!(parse_timestamp("2024-03-01 12:30:05").unwrap(), ts);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
