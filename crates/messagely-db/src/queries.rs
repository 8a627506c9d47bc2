use crate::Database;
use crate::models::{
    MailboxRow, MessageDetailRow, MessageRow, NewUser, PartyRow, UserRow, format_timestamp,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, ffi};

impl Database {
    // -- Users --

    /// Insert a user with joined_at and last_login_at both set to `now`.
    /// Returns `None` when the username is already taken.
    pub fn create_user(&self, user: &NewUser<'_>, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        let ts = format_timestamp(now);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, first_name, last_name, phone, joined_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    user.username,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.phone,
                    ts
                ],
            );

            match inserted {
                Ok(_) => query_user(conn, user.username),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
                    || is_constraint(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, username))
    }

    pub fn get_password_hash(&self, username: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT password FROM users WHERE username = ?1", [username], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    /// Returns false if no such user.
    pub fn update_last_login(&self, username: &str, now: DateTime<Utc>) -> Result<bool> {
        let ts = format_timestamp(now);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE username = ?2",
                rusqlite::params![ts, username],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_users(&self) -> Result<Vec<PartyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, first_name, last_name, phone FROM users ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], |row| party_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Insert a message with `sent_at = now` and no read_at.
    /// Returns `None` if either participant does not exist.
    pub fn insert_message(
        &self,
        from_username: &str,
        to_username: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRow>> {
        let sent_at = format_timestamp(now);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO messages (from_username, to_username, body, sent_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![from_username, to_username, body, sent_at],
            );

            match inserted {
                Ok(_) => Ok(Some(MessageRow {
                    id: conn.last_insert_rowid(),
                    from_username: from_username.to_string(),
                    to_username: to_username.to_string(),
                    body: body.to_string(),
                    sent_at,
                    read_at: None,
                })),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageDetailRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        f.username, f.first_name, f.last_name, f.phone,
                        t.username, t.first_name, t.last_name, t.phone
                 FROM messages m
                 JOIN users f ON f.username = m.from_username
                 JOIN users t ON t.username = m.to_username
                 WHERE m.id = ?1",
                [id],
                |row| {
                    Ok(MessageDetailRow {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sent_at: row.get(2)?,
                        read_at: row.get(3)?,
                        from_user: party_at(row, 4)?,
                        to_user: party_at(row, 8)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Set read_at if it is still unset, and return the stored value.
    /// A message that was already read keeps its first timestamp.
    /// Returns `None` if no such message.
    pub fn mark_read(&self, id: i64, now: DateTime<Utc>) -> Result<Option<String>> {
        let ts = format_timestamp(now);
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                rusqlite::params![ts, id],
            )?;

            let read_at: Option<Option<String>> = conn
                .query_row("SELECT read_at FROM messages WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;

            Ok(read_at.flatten())
        })
    }

    /// Messages sent by `username`, joined with each recipient. Ordered by id.
    pub fn messages_from(&self, username: &str) -> Result<Vec<MailboxRow>> {
        self.with_conn(|conn| {
            query_mailbox(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON u.username = m.to_username
                 WHERE m.from_username = ?1
                 ORDER BY m.id",
                username,
            )
        })
    }

    /// Messages received by `username`, joined with each sender. Ordered by id.
    pub fn messages_to(&self, username: &str) -> Result<Vec<MailboxRow>> {
        self.with_conn(|conn| {
            query_mailbox(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON u.username = m.from_username
                 WHERE m.to_username = ?1
                 ORDER BY m.id",
                username,
            )
        })
    }
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, password, first_name, last_name, phone, joined_at, last_login_at
         FROM users WHERE username = ?1",
    )?;

    stmt.query_row([username], |row| {
        Ok(UserRow {
            username: row.get(0)?,
            password: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            phone: row.get(4)?,
            joined_at: row.get(5)?,
            last_login_at: row.get(6)?,
        })
    })
    .optional()
}

fn query_mailbox(conn: &Connection, sql: &str, username: &str) -> Result<Vec<MailboxRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map([username], |row| {
            Ok(MailboxRow {
                id: row.get(0)?,
                body: row.get(1)?,
                sent_at: row.get(2)?,
                read_at: row.get(3)?,
                other: party_at(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Read username, first_name, last_name, phone starting at column `start`.
fn party_at(row: &Row<'_>, start: usize) -> rusqlite::Result<PartyRow> {
    Ok(PartyRow {
        username: row.get(start)?,
        first_name: row.get(start + 1)?,
        last_name: row.get(start + 2)?,
        phone: row.get(start + 3)?,
    })
}

fn is_constraint(err: &rusqlite::Error, extended_code: std::ffi::c_int) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
