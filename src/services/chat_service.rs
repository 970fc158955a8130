use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    Collection, Database,
};

use crate::db::mongo::CHAT_MESSAGES;
use crate::errors::ApiError;
use crate::models::social::{ChatMessage, ConversationView, MessageView};
use crate::services::social_service;

pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const POLL_LIMIT: i64 = 100;

pub fn validate_message(raw: &str) -> Result<String, ApiError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ApiError::bad_request("El mensaje no puede estar vacío."));
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(format!(
            "El mensaje no puede superar {} caracteres.",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(body.to_string())
}

fn messages(db: &Database) -> Collection<ChatMessage> {
    db.collection(CHAT_MESSAGES)
}

fn conversation_filter(a: ObjectId, b: ObjectId) -> Document {
    doc! {
        "$or": [
            { "sender_id": a, "recipient_id": b },
            { "sender_id": b, "recipient_id": a },
        ]
    }
}

async fn ensure_friends(db: &Database, user: ObjectId, friend: ObjectId) -> Result<(), ApiError> {
    if user == friend || !social_service::are_friends(db, user, friend).await? {
        return Err(ApiError::forbidden("Solo puedes chatear con tus amigos."));
    }
    Ok(())
}

pub async fn send_message(
    db: &Database,
    sender: ObjectId,
    recipient: ObjectId,
    body: &str,
) -> Result<ChatMessage, ApiError> {
    let body = validate_message(body)?;
    ensure_friends(db, sender, recipient).await?;

    let mut message = ChatMessage {
        id: None,
        sender_id: sender,
        recipient_id: recipient,
        body,
        created_at: bson::DateTime::now(),
        read_at: None,
    };
    let result = messages(db).insert_one(&message).await?;
    message.id = result.inserted_id.as_object_id();
    Ok(message)
}

/// Messages of the conversation strictly newer than `after`, oldest first.
/// Incoming unread messages in the batch are marked read.
pub async fn poll(
    db: &Database,
    user: ObjectId,
    friend: ObjectId,
    after: Option<DateTime<Utc>>,
) -> Result<Vec<ChatMessage>, ApiError> {
    ensure_friends(db, user, friend).await?;

    let mut filter = conversation_filter(user, friend);
    if let Some(after) = after {
        filter.insert("created_at", doc! { "$gt": bson::DateTime::from_chrono(after) });
    }
    let mut batch: Vec<ChatMessage> = messages(db)
        .find(filter)
        .sort(doc! { "created_at": 1 })
        .limit(POLL_LIMIT)
        .await?
        .try_collect()
        .await?;

    let unread: Vec<ObjectId> = batch
        .iter()
        .filter(|m| m.recipient_id == user && m.read_at.is_none())
        .filter_map(|m| m.id)
        .collect();
    if !unread.is_empty() {
        let now = bson::DateTime::now();
        messages(db)
            .update_many(
                doc! { "_id": { "$in": unread.clone() } },
                doc! { "$set": { "read_at": now } },
            )
            .await?;
        for message in batch.iter_mut() {
            if message.id.is_some_and(|id| unread.contains(&id)) {
                message.read_at = Some(now);
            }
        }
    }
    Ok(batch)
}

/// One entry per friend with the last message and unread count, most recent
/// conversation first; friends without messages go last.
pub async fn conversations(db: &Database, user: ObjectId) -> Result<Vec<ConversationView>, ApiError> {
    let friends = social_service::list_friends(db, user).await?;

    let mut entries = Vec::with_capacity(friends.len());
    for friend in friends {
        let friend_id = ObjectId::parse_str(&friend.user_id)?;
        let last = messages(db)
            .find_one(conversation_filter(user, friend_id))
            .sort(doc! { "created_at": -1 })
            .await?;
        let unread_count = messages(db)
            .count_documents(doc! {
                "sender_id": friend_id,
                "recipient_id": user,
                "read_at": null,
            })
            .await?;
        entries.push(ConversationView {
            friend_id: friend.user_id,
            display_name: friend.display_name,
            username_slug: friend.username_slug,
            last_message: last.as_ref().map(MessageView::from),
            unread_count,
        });
    }

    entries.sort_by(|a, b| {
        let a_at = a.last_message.as_ref().map(|m| m.created_at);
        let b_at = b.last_message.as_ref().map(|m| m.created_at);
        b_at.cmp(&a_at)
    });
    Ok(entries)
}
