use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Rejected => "rejected",
            FriendRequestStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FriendRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub from_user: ObjectId,
    pub to_user: ObjectId,
    pub status: FriendRequestStatus,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

/// Undirected friendship stored as an ordered pair, `user1 < user2`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Friendship {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user1: ObjectId,
    pub user2: ObjectId,
    pub created_at: bson::DateTime,
}

impl Friendship {
    pub fn new(a: ObjectId, b: ObjectId) -> Self {
        let (user1, user2) = ordered_pair(a, b);
        Self {
            id: None,
            user1,
            user2,
            created_at: bson::DateTime::now(),
        }
    }

    pub fn other(&self, user: ObjectId) -> ObjectId {
        if self.user1 == user {
            self.user2
        } else {
            self.user1
        }
    }
}

pub fn ordered_pair(a: ObjectId, b: ObjectId) -> (ObjectId, ObjectId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub sender_id: ObjectId,
    pub recipient_id: ObjectId,
    pub body: String,
    pub created_at: bson::DateTime,
    pub read_at: Option<bson::DateTime>,
}

#[derive(Debug, Deserialize)]
pub struct FriendRequestInput {
    pub to_username: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageInput {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestView {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_username_slug: Option<String>,
}

impl From<&FriendRequest> for FriendRequestView {
    fn from(request: &FriendRequest) -> Self {
        Self {
            id: request.id.map(|id| id.to_hex()).unwrap_or_default(),
            from_user: request.from_user.to_hex(),
            to_user: request.to_user.to_hex(),
            status: request.status,
            created_at: request.created_at.to_chrono(),
            other_display_name: None,
            other_username_slug: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestsResponse {
    pub incoming: Vec<FriendRequestView>,
    pub outgoing: Vec<FriendRequestView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestOutcome {
    pub status: FriendRequestStatus,
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendView {
    pub user_id: String,
    pub display_name: String,
    pub username_slug: String,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.map(|id| id.to_hex()).unwrap_or_default(),
            sender_id: message.sender_id.to_hex(),
            recipient_id: message.recipient_id.to_hex(),
            body: message.body.clone(),
            created_at: message.created_at.to_chrono(),
            read: message.read_at.is_some(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationView {
    pub friend_id: String,
    pub display_name: String,
    pub username_slug: String,
    pub last_message: Option<MessageView>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SocialCounts {
    pub pending_requests_count: u64,
    pub unread_messages_count: u64,
}
