use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use messagely_db::Database;
use messagely_db::models::{MailboxRow, NewUser, UserRow};
use messagely_types::api::RegisterRequest;
use messagely_types::models::{ReceivedMessage, SentMessage, UserDetail, UserProfile, UserSummary};

use super::{optional_timestamp, summary, timestamp};
use crate::config::HashParams;
use crate::error::ApiError;

/// A freshly registered account, as stored. Carries the password hash;
/// convert with [`RegisteredUser::profile`] before sending it anywhere.
#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub joined_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl RegisteredUser {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            joined_at: self.joined_at,
        }
    }
}

impl TryFrom<UserRow> for RegisteredUser {
    type Error = ApiError;

    fn try_from(row: UserRow) -> Result<Self, ApiError> {
        Ok(Self {
            joined_at: timestamp(&row.joined_at, "joined_at")?,
            last_login_at: timestamp(&row.last_login_at, "last_login_at")?,
            username: row.username,
            password_hash: row.password,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
        })
    }
}

/// Registration, credential checks and per-user lookups.
pub struct AccountManager {
    db: Arc<Database>,
    hasher: Argon2<'static>,
}

impl AccountManager {
    pub fn new(db: Arc<Database>, params: &HashParams) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            hasher: params.hasher()?,
        })
    }

    /// Hash the password and store the user. A taken username surfaces as
    /// `Conflict` from the primary-key constraint.
    pub fn register(&self, req: &RegisterRequest) -> Result<RegisteredUser, ApiError> {
        req.validate()?;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
            .to_string();

        let new_user = NewUser {
            username: &req.username,
            password_hash: &password_hash,
            first_name: &req.first_name,
            last_name: &req.last_name,
            phone: &req.phone,
        };

        let row = self
            .db
            .create_user(&new_user, Utc::now())?
            .ok_or_else(|| ApiError::Conflict(format!("Username already taken: {}", req.username)))?;

        info!("Registered user {}", row.username);
        row.try_into()
    }

    /// True iff the user exists and the password matches. Unknown users and
    /// wrong passwords are indistinguishable to the caller.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        let Some(stored) = self.db.get_password_hash(username)? else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(&stored)
            .map_err(|e| anyhow::anyhow!("Unreadable password hash for {}: {}", username, e))?;

        Ok(self.hasher.verify_password(password.as_bytes(), &parsed).is_ok())
    }

    pub fn update_login_timestamp(&self, username: &str) -> Result<(), ApiError> {
        if !self.db.update_last_login(username, Utc::now())? {
            warn!("Login timestamp update for unknown user {}", username);
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<UserSummary>, ApiError> {
        Ok(self.db.list_users()?.into_iter().map(summary).collect())
    }

    pub fn get(&self, username: &str) -> Result<UserDetail, ApiError> {
        let row = self
            .db
            .get_user(username)?
            .ok_or_else(|| ApiError::not_found(format!("No such user: {}", username)))?;

        Ok(UserDetail {
            joined_at: timestamp(&row.joined_at, "joined_at")?,
            last_login_at: timestamp(&row.last_login_at, "last_login_at")?,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
        })
    }

    /// Outbox of `username`, ordered by message id.
    pub fn messages_from(&self, username: &str) -> Result<Vec<SentMessage>, ApiError> {
        let rows = self.db.messages_from(username)?;
        rows.into_iter()
            .map(|row| -> Result<SentMessage, ApiError> {
                let (id, body, sent_at, read_at, other) = mailbox_parts(row)?;
                Ok(SentMessage {
                    id,
                    body,
                    sent_at,
                    read_at,
                    to_user: other,
                })
            })
            .collect()
    }

    /// Inbox of `username`, ordered by message id.
    pub fn messages_to(&self, username: &str) -> Result<Vec<ReceivedMessage>, ApiError> {
        let rows = self.db.messages_to(username)?;
        rows.into_iter()
            .map(|row| -> Result<ReceivedMessage, ApiError> {
                let (id, body, sent_at, read_at, other) = mailbox_parts(row)?;
                Ok(ReceivedMessage {
                    id,
                    body,
                    sent_at,
                    read_at,
                    from_user: other,
                })
            })
            .collect()
    }
}

type MailboxParts = (i64, String, DateTime<Utc>, Option<DateTime<Utc>>, UserSummary);

fn mailbox_parts(row: MailboxRow) -> Result<MailboxParts, ApiError> {
    Ok((
        row.id,
        row.body,
        timestamp(&row.sent_at, "sent_at")?,
        optional_timestamp(row.read_at.as_deref(), "read_at")?,
        summary(row.other),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AccountManager {
        let db = Arc::new(Database::open_in_memory().unwrap());
        AccountManager::new(db, &HashParams::minimal()).unwrap()
    }

    fn request(username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: password.into(),
            first_name: "Test".into(),
            last_name: "Testy".into(),
            phone: "+14155550000".into(),
        }
    }

    #[test]
    fn register_then_authenticate() {
        let accounts = manager();
        let user = accounts.register(&request("alice", "password")).unwrap();

        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "password");
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert_eq!(user.joined_at, user.last_login_at);

        assert!(accounts.authenticate("alice", "password").unwrap());
    }

    #[test]
    fn wrong_password_and_unknown_user_are_just_false() {
        let accounts = manager();
        accounts.register(&request("alice", "password")).unwrap();

        assert!(!accounts.authenticate("alice", "passw0rd").unwrap());
        assert!(!accounts.authenticate("nobody", "password").unwrap());
    }

    #[test]
    fn duplicate_username_conflicts() {
        let accounts = manager();
        accounts.register(&request("alice", "password")).unwrap();

        let err = accounts.register(&request("alice", "different")).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        // the first registration still holds
        assert!(accounts.authenticate("alice", "password").unwrap());
    }

    #[test]
    fn invalid_registration_is_rejected_before_storage() {
        let accounts = manager();
        let err = accounts.register(&request("al", "password")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(accounts.all().unwrap().is_empty());
    }

    #[test]
    fn get_reports_missing_user() {
        let accounts = manager();
        accounts.register(&request("alice", "password")).unwrap();

        let detail = accounts.get("alice").unwrap();
        assert_eq!(detail.first_name, "Test");

        match accounts.get("bob") {
            Err(ApiError::NotFound(msg)) => assert_eq!(msg, "No such user: bob"),
            other => panic!("expected NotFound, got {:?}", other.map(|u| u.username)),
        }
    }

    #[test]
    fn login_timestamp_moves_forward() {
        let accounts = manager();
        let user = accounts.register(&request("alice", "password")).unwrap();

        accounts.update_login_timestamp("alice").unwrap();
        let detail = accounts.get("alice").unwrap();
        assert!(detail.last_login_at >= user.last_login_at);
        assert_eq!(detail.joined_at, user.joined_at);

        // unknown users are ignored
        accounts.update_login_timestamp("ghost").unwrap();
    }

    #[test]
    fn corrupt_stored_timestamp_is_an_internal_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let accounts = AccountManager::new(db.clone(), &HashParams::minimal()).unwrap();
        accounts.register(&request("alice", "password")).unwrap();

        db.with_conn(|conn| {
            conn.execute("UPDATE users SET joined_at = 'garbage' WHERE username = 'alice'", [])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(accounts.get("alice"), Err(ApiError::Internal(_))));
    }

    #[test]
    fn all_lists_public_fields() {
        let accounts = manager();
        accounts.register(&request("bob", "password")).unwrap();
        accounts.register(&request("alice", "password")).unwrap();

        let users = accounts.all().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(users[0].phone, "+14155550000");
    }
}
