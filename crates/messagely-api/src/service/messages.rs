use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use messagely_db::Database;
use messagely_types::api::SendMessageRequest;
use messagely_types::models::{CreatedMessage, MessageDetail, ReadReceipt};

use super::{optional_timestamp, summary, timestamp};
use crate::error::ApiError;

/// Message shown to someone who is not a participant. Deliberately the same
/// shape as any other 404 so the message's existence is not confirmed.
const HIDDEN: &str = "Not Found";

pub struct NewMessage<'a> {
    pub from_username: &'a str,
    pub to_username: &'a str,
    pub body: &'a str,
}

/// Creation, lookup and read-marking of direct messages.
///
/// `create`, `get` and `mark_read` are the raw operations. The `*_as`/`send`
/// variants are what the HTTP layer calls: they take the acting username from
/// the verified session and apply the access rules:
///
/// - viewing needs the actor to be sender or recipient, otherwise `NotFound`;
/// - marking read checks existence first (`NotFound`), then needs the actor
///   to be the recipient (`Unauthorized`);
/// - the sender of a new message is always the actor.
pub struct MessageService {
    db: Arc<Database>,
}

impl MessageService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, msg: NewMessage<'_>) -> Result<CreatedMessage, ApiError> {
        if !self.db.user_exists(msg.to_username)? {
            return Err(ApiError::not_found(HIDDEN));
        }

        let row = self
            .db
            .insert_message(msg.from_username, msg.to_username, msg.body, Utc::now())?
            // a participant vanished between the check and the insert
            .ok_or_else(|| ApiError::not_found(HIDDEN))?;

        Ok(CreatedMessage {
            id: row.id,
            sent_at: timestamp(&row.sent_at, "sent_at")?,
            from_username: row.from_username,
            to_username: row.to_username,
            body: row.body,
        })
    }

    pub fn get(&self, id: i64) -> Result<MessageDetail, ApiError> {
        let row = self
            .db
            .get_message(id)?
            .ok_or_else(|| ApiError::not_found(format!("No such message: {}", id)))?;

        Ok(MessageDetail {
            id: row.id,
            sent_at: timestamp(&row.sent_at, "sent_at")?,
            read_at: optional_timestamp(row.read_at.as_deref(), "read_at")?,
            body: row.body,
            from_user: summary(row.from_user),
            to_user: summary(row.to_user),
        })
    }

    /// Idempotent: a message that is already read keeps its first read_at.
    pub fn mark_read(&self, id: i64) -> Result<ReadReceipt, ApiError> {
        let read_at = self
            .db
            .mark_read(id, Utc::now())?
            .ok_or_else(|| ApiError::not_found(format!("No such message: {}", id)))?;

        Ok(ReadReceipt {
            id,
            read_at: timestamp(&read_at, "read_at")?,
        })
    }

    pub fn send(&self, actor: &str, req: &SendMessageRequest) -> Result<CreatedMessage, ApiError> {
        req.validate()?;
        self.create(NewMessage {
            from_username: actor,
            to_username: &req.to_username,
            body: &req.body,
        })
    }

    pub fn view(&self, id: i64, actor: &str) -> Result<MessageDetail, ApiError> {
        let message = self.get(id)?;
        if !message.is_participant(actor) {
            debug!("{} denied view of message {}", actor, id);
            return Err(ApiError::not_found(HIDDEN));
        }
        Ok(message)
    }

    pub fn mark_read_as(&self, id: i64, actor: &str) -> Result<ReadReceipt, ApiError> {
        let message = self.get(id)?;
        if !message.is_recipient(actor) {
            warn!("{} tried to mark message {} read but is not its recipient", actor, id);
            return Err(ApiError::Unauthorized);
        }
        self.mark_read(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messagely_db::models::NewUser;

    fn service_with_users(names: &[&str]) -> MessageService {
        MessageService::new(db_with_users(names))
    }

    fn db_with_users(names: &[&str]) -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for name in names {
            let user = NewUser {
                username: name,
                password_hash: "x",
                first_name: name,
                last_name: "Test",
                phone: "555",
            };
            db.create_user(&user, Utc::now()).unwrap();
        }
        db
    }

    fn send(svc: &MessageService, from: &str, to: &str, body: &str) -> CreatedMessage {
        svc.send(
            from,
            &SendMessageRequest {
                to_username: to.into(),
                body: body.into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn participants_can_view_others_cannot() {
        let svc = service_with_users(&["alice", "bob", "carol"]);
        let msg = send(&svc, "alice", "bob", "hi");

        assert_eq!(svc.view(msg.id, "alice").unwrap().body, "hi");
        let seen_by_bob = svc.view(msg.id, "bob").unwrap();
        assert_eq!(seen_by_bob.from_user.username, "alice");
        assert_eq!(seen_by_bob.to_user.username, "bob");

        match svc.view(msg.id, "carol") {
            Err(ApiError::NotFound(m)) => assert_eq!(m, "Not Found"),
            other => panic!("expected hidden NotFound, got {:?}", other.map(|m| m.id)),
        }
    }

    #[test]
    fn missing_message_names_the_id() {
        let svc = service_with_users(&["alice"]);
        match svc.view(-1, "alice") {
            Err(ApiError::NotFound(m)) => assert_eq!(m, "No such message: -1"),
            other => panic!("expected NotFound, got {:?}", other.map(|m| m.id)),
        }
    }

    #[test]
    fn only_recipient_marks_read() {
        let svc = service_with_users(&["alice", "bob", "carol"]);
        let msg = send(&svc, "alice", "bob", "hi");

        assert!(matches!(svc.mark_read_as(msg.id, "alice"), Err(ApiError::Unauthorized)));
        assert!(matches!(svc.mark_read_as(msg.id, "carol"), Err(ApiError::Unauthorized)));
        assert!(svc.get(msg.id).unwrap().read_at.is_none());

        let receipt = svc.mark_read_as(msg.id, "bob").unwrap();
        assert_eq!(receipt.id, msg.id);
        assert_eq!(svc.get(msg.id).unwrap().read_at, Some(receipt.read_at));
    }

    #[test]
    fn mark_read_checks_existence_before_permission() {
        let svc = service_with_users(&["alice"]);
        assert!(matches!(svc.mark_read_as(42, "alice"), Err(ApiError::NotFound(_))));
        assert!(matches!(svc.mark_read(42), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let svc = service_with_users(&["alice", "bob"]);
        let msg = send(&svc, "alice", "bob", "hi");

        let first = svc.mark_read_as(msg.id, "bob").unwrap();
        let second = svc.mark_read_as(msg.id, "bob").unwrap();
        assert_eq!(first.read_at, second.read_at);
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let svc = service_with_users(&["alice"]);
        let err = svc
            .send(
                "alice",
                &SendMessageRequest {
                    to_username: "test4".into(),
                    body: "hello".into(),
                },
            )
            .unwrap_err();
        match err {
            ApiError::NotFound(m) => assert_eq!(m, "Not Found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn created_message_echoes_fields() {
        let svc = service_with_users(&["alice", "bob"]);
        let msg = send(&svc, "alice", "bob", "Hello bob");
        assert_eq!(msg.from_username, "alice");
        assert_eq!(msg.to_username, "bob");
        assert_eq!(msg.body, "Hello bob");

        let second = send(&svc, "bob", "alice", "Hi alice");
        assert!(second.id > msg.id);
    }

    #[test]
    fn corrupt_sent_at_is_an_internal_error() {
        let db = db_with_users(&["alice", "bob"]);
        let svc = MessageService::new(db.clone());
        let msg = send(&svc, "alice", "bob", "hi");

        db.with_conn(|conn| {
            conn.execute("UPDATE messages SET sent_at = 'garbage'", [])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(svc.view(msg.id, "bob"), Err(ApiError::Internal(_))));
    }
}
