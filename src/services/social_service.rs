//! Friend requests, friendships and the relationship between two users.

use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    Collection, Database,
};
use std::collections::HashMap;

use crate::db::mongo::{is_duplicate_key, CHAT_MESSAGES, FRIENDSHIPS, FRIEND_REQUESTS, PROFILES, USERS};
use crate::errors::ApiError;
use crate::models::profile::{Relationship, UserProfile};
use crate::models::social::{
    ordered_pair, FriendRequest, FriendRequestStatus, FriendRequestView, FriendRequestsResponse,
    FriendView, Friendship, SocialCounts,
};
use crate::models::user::User;

/// What sending a request to someone resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPlan {
    /// No request in either direction: create a pending one.
    Create,
    /// The target already asked us: accept their request instead.
    AcceptReverse(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    Reject,
    Cancel,
}

impl RequestAction {
    fn target_status(&self) -> FriendRequestStatus {
        match self {
            RequestAction::Accept => FriendRequestStatus::Accepted,
            RequestAction::Reject => FriendRequestStatus::Rejected,
            RequestAction::Cancel => FriendRequestStatus::Canceled,
        }
    }
}

/// State gathered before sending a friend request.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub is_self: bool,
    pub target_allows_requests: bool,
    pub already_friends: bool,
    pub own_pending: bool,
    pub reverse_pending: Option<ObjectId>,
}

pub fn plan_request(context: &RequestContext) -> Result<RequestPlan, ApiError> {
    if context.is_self {
        return Err(ApiError::bad_request("No puedes enviarte una solicitud a ti mismo."));
    }
    if !context.target_allows_requests {
        return Err(ApiError::forbidden("Este usuario no acepta solicitudes de amistad."));
    }
    if context.already_friends {
        return Err(ApiError::conflict("Ya son amigos."));
    }
    if context.own_pending {
        return Err(ApiError::conflict("Ya enviaste una solicitud a este usuario."));
    }
    Ok(match context.reverse_pending {
        Some(request_id) => RequestPlan::AcceptReverse(request_id),
        None => RequestPlan::Create,
    })
}

/// Validates that `actor` may apply `action` to `request`. Only the recipient
/// accepts or rejects, only the sender cancels, and only pending requests move.
pub fn check_transition(
    request: &FriendRequest,
    actor: ObjectId,
    action: RequestAction,
) -> Result<FriendRequestStatus, ApiError> {
    let allowed = match action {
        RequestAction::Accept | RequestAction::Reject => request.to_user == actor,
        RequestAction::Cancel => request.from_user == actor,
    };
    if !allowed {
        return Err(ApiError::forbidden("No puedes modificar esta solicitud."));
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(ApiError::conflict(format!(
            "La solicitud ya está {}.",
            request.status.as_str()
        )));
    }
    Ok(action.target_status())
}

pub fn relationship_from(
    viewer: ObjectId,
    target: ObjectId,
    are_friends: bool,
    pending: Option<&FriendRequest>,
) -> Relationship {
    if viewer == target {
        return Relationship::Myself;
    }
    if are_friends {
        return Relationship::Friends;
    }
    match pending {
        Some(request) if request.from_user == viewer => Relationship::RequestSent,
        Some(_) => Relationship::RequestReceived,
        None => Relationship::None,
    }
}

fn requests(db: &Database) -> Collection<FriendRequest> {
    db.collection(FRIEND_REQUESTS)
}

fn friendships(db: &Database) -> Collection<Friendship> {
    db.collection(FRIENDSHIPS)
}

pub async fn are_friends(db: &Database, a: ObjectId, b: ObjectId) -> Result<bool, ApiError> {
    let (user1, user2) = ordered_pair(a, b);
    Ok(friendships(db)
        .count_documents(doc! { "user1": user1, "user2": user2 })
        .await?
        > 0)
}

async fn pending_between(
    db: &Database,
    a: ObjectId,
    b: ObjectId,
) -> Result<Vec<FriendRequest>, ApiError> {
    let cursor = requests(db)
        .find(doc! {
            "status": FriendRequestStatus::Pending.as_str(),
            "$or": [
                { "from_user": a, "to_user": b },
                { "from_user": b, "to_user": a },
            ],
        })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn relationship(
    db: &Database,
    viewer: Option<ObjectId>,
    target: ObjectId,
) -> Result<Relationship, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(Relationship::None);
    };
    if viewer == target {
        return Ok(Relationship::Myself);
    }
    let friends = are_friends(db, viewer, target).await?;
    let pending = if friends {
        Vec::new()
    } else {
        pending_between(db, viewer, target).await?
    };
    Ok(relationship_from(viewer, target, friends, pending.first()))
}

async fn create_friendship(db: &Database, a: ObjectId, b: ObjectId) -> Result<(), ApiError> {
    match friendships(db).insert_one(Friendship::new(a, b)).await {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate_key(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Moves a pending request to `status`. Returns the updated request, or a
/// conflict when it stopped being pending in the meantime.
async fn settle(
    db: &Database,
    request_id: ObjectId,
    status: FriendRequestStatus,
) -> Result<FriendRequest, ApiError> {
    let updated = requests(db)
        .find_one_and_update(
            doc! { "_id": request_id, "status": FriendRequestStatus::Pending.as_str() },
            doc! { "$set": { "status": status.as_str(), "updated_at": bson::DateTime::now() } },
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?;
    updated.ok_or_else(|| ApiError::conflict("La solicitud ya no está pendiente."))
}

/// Sends a friend request by username. Returns the resulting request and
/// whether a new one was created (`false` when a reverse request was accepted).
pub async fn send_request(
    db: &Database,
    from: ObjectId,
    to_username: &str,
) -> Result<(FriendRequest, bool), ApiError> {
    let username = to_username.trim();
    if username.is_empty() {
        return Err(ApiError::bad_request("to_username es obligatorio."));
    }
    let target = db
        .collection::<User>(USERS)
        .find_one(doc! { "username": username })
        .await?
        .and_then(|user| user.id)
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado."))?;

    let target_profile = db
        .collection::<UserProfile>(PROFILES)
        .find_one(doc! { "user_id": target })
        .await?;
    let pending = if from == target {
        Vec::new()
    } else {
        pending_between(db, from, target).await?
    };

    let context = RequestContext {
        is_self: from == target,
        target_allows_requests: target_profile
            .map(|profile| profile.allow_friend_requests)
            .unwrap_or(true),
        already_friends: from != target && are_friends(db, from, target).await?,
        own_pending: pending.iter().any(|r| r.from_user == from),
        reverse_pending: pending.iter().find(|r| r.from_user == target).and_then(|r| r.id),
    };

    match plan_request(&context)? {
        RequestPlan::AcceptReverse(request_id) => {
            let request = settle(db, request_id, FriendRequestStatus::Accepted).await?;
            create_friendship(db, from, target).await?;
            log::info!("Mutual request between {} and {} accepted", from, target);
            Ok((request, false))
        }
        RequestPlan::Create => {
            let now = bson::DateTime::now();
            let mut request = FriendRequest {
                id: None,
                from_user: from,
                to_user: target,
                status: FriendRequestStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            let result = requests(db).insert_one(&request).await.map_err(|err| {
                if is_duplicate_key(&err) {
                    ApiError::conflict("Ya enviaste una solicitud a este usuario.")
                } else {
                    err.into()
                }
            })?;
            request.id = result.inserted_id.as_object_id();
            Ok((request, true))
        }
    }
}

pub async fn respond(
    db: &Database,
    actor: ObjectId,
    request_id: ObjectId,
    action: RequestAction,
) -> Result<FriendRequest, ApiError> {
    let request = requests(db)
        .find_one(doc! { "_id": request_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Solicitud no encontrada."))?;
    let status = check_transition(&request, actor, action)?;

    let settled = settle(db, request_id, status).await?;
    if status == FriendRequestStatus::Accepted {
        create_friendship(db, settled.from_user, settled.to_user).await?;
    }
    Ok(settled)
}

async fn profiles_by_user(
    db: &Database,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, UserProfile>, ApiError> {
    let found: Vec<UserProfile> = db
        .collection::<UserProfile>(PROFILES)
        .find(doc! { "user_id": { "$in": ids.to_vec() } })
        .await?
        .try_collect()
        .await?;
    Ok(found.into_iter().map(|p| (p.user_id, p)).collect())
}

/// Pending requests addressed to and sent by the user, newest first.
pub async fn list_requests(db: &Database, user: ObjectId) -> Result<FriendRequestsResponse, ApiError> {
    let pending: Vec<FriendRequest> = requests(db)
        .find(doc! {
            "status": FriendRequestStatus::Pending.as_str(),
            "$or": [{ "from_user": user }, { "to_user": user }],
        })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let others: Vec<ObjectId> = pending
        .iter()
        .map(|r| if r.from_user == user { r.to_user } else { r.from_user })
        .collect();
    let profiles = profiles_by_user(db, &others).await?;

    let mut response = FriendRequestsResponse {
        incoming: Vec::new(),
        outgoing: Vec::new(),
    };
    for (request, other) in pending.iter().zip(others) {
        let mut view = FriendRequestView::from(request);
        if let Some(profile) = profiles.get(&other) {
            view.other_display_name = Some(profile.display_name.clone());
            view.other_username_slug = Some(profile.username_slug.clone());
        }
        if request.to_user == user {
            response.incoming.push(view);
        } else {
            response.outgoing.push(view);
        }
    }
    Ok(response)
}

pub async fn list_friendships(db: &Database, user: ObjectId) -> Result<Vec<Friendship>, ApiError> {
    let cursor = friendships(db)
        .find(doc! { "$or": [{ "user1": user }, { "user2": user }] })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn list_friends(db: &Database, user: ObjectId) -> Result<Vec<FriendView>, ApiError> {
    let friendships = list_friendships(db, user).await?;
    let ids: Vec<ObjectId> = friendships.iter().map(|f| f.other(user)).collect();
    let profiles = profiles_by_user(db, &ids).await?;

    Ok(friendships
        .iter()
        .filter_map(|friendship| {
            let other = friendship.other(user);
            let profile = profiles.get(&other)?;
            Some(FriendView {
                user_id: other.to_hex(),
                display_name: profile.display_name.clone(),
                username_slug: profile.username_slug.clone(),
                since: friendship.created_at.to_chrono(),
            })
        })
        .collect())
}

pub async fn remove_friend(db: &Database, user: ObjectId, other: ObjectId) -> Result<(), ApiError> {
    let (user1, user2) = ordered_pair(user, other);
    let deleted = friendships(db)
        .delete_one(doc! { "user1": user1, "user2": user2 })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(ApiError::not_found("No son amigos."));
    }
    log::info!("Friendship between {} and {} removed", user, other);
    Ok(())
}

pub async fn counts(db: &Database, user: ObjectId) -> Result<SocialCounts, ApiError> {
    let pending_requests_count = requests(db)
        .count_documents(doc! {
            "to_user": user,
            "status": FriendRequestStatus::Pending.as_str(),
        })
        .await?;
    let unread_messages_count = db
        .collection::<Document>(CHAT_MESSAGES)
        .count_documents(doc! { "recipient_id": user, "read_at": null })
        .await?;
    Ok(SocialCounts {
        pending_requests_count,
        unread_messages_count,
    })
}
