use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    Collection, Database,
};
use rand::{distributions::Alphanumeric, Rng};

use crate::db::mongo::{is_duplicate_key, PLANS, PLAN_COMMENTS, PLAN_LIKES, PLAN_SAVES};
use crate::errors::ApiError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::generation::GeneratedPlan;
use crate::models::plan::{Plan, PlanComment, PlanItem, PlanLike, PlanUpdate, ViewerState, MAX_TITLE_LEN};

pub const SHARE_CODE_LEN: usize = 12;
pub const FEED_LIMIT: i64 = 50;
pub const MAX_COMMENT_CHARS: usize = 500;
const SHARE_CODE_ATTEMPTS: usize = 3;

/// Which bookmark-like relation a toggle touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Save,
}

impl Reaction {
    fn collection(&self) -> &'static str {
        match self {
            Reaction::Like => PLAN_LIKES,
            Reaction::Save => PLAN_SAVES,
        }
    }

    fn counter(&self) -> &'static str {
        match self {
            Reaction::Like => "likes_count",
            Reaction::Save => "saves_count",
        }
    }
}

pub fn generate_share_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_CODE_LEN)
        .map(char::from)
        .collect()
}

/// A new private plan owned by `owner`, holding the whole generation payload.
pub fn build_plan(
    owner: &AuthenticatedUser,
    prompt: &str,
    generated: &GeneratedPlan,
) -> Result<Plan, ApiError> {
    let plan_json = serde_json::to_value(generated)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize plan: {}", e)))?;
    let itinerary = &generated.itinerary;
    let mood = if generated.parsed_request.mood.is_empty() {
        itinerary.mood.clone()
    } else {
        generated.parsed_request.mood.clone()
    };
    let now = bson::DateTime::now();

    Ok(Plan {
        id: None,
        owner_id: owner.user_id,
        owner_username: owner.username.clone(),
        title: itinerary.title.chars().take(MAX_TITLE_LEN).collect(),
        city: generated.resolved_location.city_name.clone(),
        city_slug: generated.resolved_location.city_slug.clone(),
        mood,
        group: generated.parsed_request.group.clone(),
        budget_cop: generated.parsed_request.budget_cop,
        prompt_text: prompt.trim().to_string(),
        plan_json,
        items: PlanItem::from_itinerary(itinerary),
        is_public: false,
        share_code: generate_share_code(),
        likes_count: 0,
        saves_count: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn can_view(plan: &Plan, viewer: Option<ObjectId>) -> bool {
    plan.is_public || viewer == Some(plan.owner_id)
}

pub fn validate_title(raw: &str) -> Result<String, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("El título no puede estar vacío."));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "El título no puede superar {} caracteres.",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

pub fn validate_comment(raw: &str) -> Result<String, ApiError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ApiError::bad_request("El comentario no puede estar vacío."));
    }
    if body.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::bad_request(format!(
            "El comentario no puede superar {} caracteres.",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(body.to_string())
}

pub fn can_delete_comment(comment: &PlanComment, plan: &Plan, user: ObjectId) -> bool {
    comment.author_id == user || plan.owner_id == user
}

fn plans(db: &Database) -> Collection<Plan> {
    db.collection(PLANS)
}

/// Inserts the plan, drawing a fresh share code on the rare collision.
pub async fn insert_plan(db: &Database, mut plan: Plan) -> Result<Plan, ApiError> {
    for attempt in 1..=SHARE_CODE_ATTEMPTS {
        match plans(db).insert_one(&plan).await {
            Ok(result) => {
                plan.id = result.inserted_id.as_object_id();
                log::info!(
                    "Stored plan {:?} for {} with {} items",
                    plan.id,
                    plan.owner_username,
                    plan.items.len()
                );
                return Ok(plan);
            }
            Err(err) if is_duplicate_key(&err) && attempt < SHARE_CODE_ATTEMPTS => {
                log::warn!("Share code collision, regenerating");
                plan.share_code = generate_share_code();
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(ApiError::Internal("Failed to store plan".to_string()))
}

pub async fn find_plan(db: &Database, plan_id: ObjectId) -> Result<Plan, ApiError> {
    plans(db)
        .find_one(doc! { "_id": plan_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Plan no encontrado."))
}

/// Loads a plan the viewer may see. Hidden plans look like missing ones.
pub async fn find_visible(
    db: &Database,
    plan_id: ObjectId,
    viewer: Option<ObjectId>,
) -> Result<Plan, ApiError> {
    let plan = find_plan(db, plan_id).await?;
    if can_view(&plan, viewer) {
        Ok(plan)
    } else {
        Err(ApiError::not_found("Plan no encontrado."))
    }
}

pub async fn find_owned(db: &Database, plan_id: ObjectId, owner: ObjectId) -> Result<Plan, ApiError> {
    let plan = find_plan(db, plan_id).await?;
    if plan.owner_id != owner {
        return Err(ApiError::forbidden("Solo el dueño puede modificar este plan."));
    }
    Ok(plan)
}

pub async fn find_by_share_code(db: &Database, code: &str) -> Result<Plan, ApiError> {
    plans(db)
        .find_one(doc! { "share_code": code.trim() })
        .await?
        .ok_or_else(|| ApiError::not_found("Plan no encontrado."))
}

pub async fn list_mine(db: &Database, owner: ObjectId) -> Result<Vec<Plan>, ApiError> {
    let cursor = plans(db)
        .find(doc! { "owner_id": owner })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn list_feed(db: &Database, city_slug: Option<&str>) -> Result<Vec<Plan>, ApiError> {
    let mut filter = doc! { "is_public": true };
    if let Some(slug) = city_slug.filter(|slug| !slug.is_empty()) {
        filter.insert("city_slug", slug);
    }
    let cursor = plans(db)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .limit(FEED_LIMIT)
        .await?;
    Ok(cursor.try_collect().await?)
}

/// Plans bookmarked by the user, most recently saved first. Plans that became
/// private are skipped unless the user owns them.
pub async fn list_saved(db: &Database, user: ObjectId) -> Result<Vec<Plan>, ApiError> {
    let saves: Vec<PlanLike> = db
        .collection::<PlanLike>(PLAN_SAVES)
        .find(doc! { "user_id": user })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;
    let ids: Vec<ObjectId> = saves.iter().map(|save| save.plan_id).collect();

    let found: Vec<Plan> = plans(db)
        .find(doc! { "_id": { "$in": ids.clone() } })
        .await?
        .try_collect()
        .await?;

    Ok(ids
        .iter()
        .filter_map(|id| found.iter().find(|plan| plan.id == Some(*id)))
        .filter(|plan| can_view(plan, Some(user)))
        .cloned()
        .collect())
}

pub async fn update_plan(db: &Database, plan: &Plan, update: PlanUpdate) -> Result<Plan, ApiError> {
    let mut set = Document::new();
    if let Some(title) = update.title.as_deref() {
        set.insert("title", validate_title(title)?);
    }
    if let Some(is_public) = update.is_public {
        set.insert("is_public", is_public);
    }
    if set.is_empty() {
        return Ok(plan.clone());
    }
    set.insert("updated_at", bson::DateTime::now());

    let plan_id = plan.id.ok_or_else(|| ApiError::Internal("Plan without id".to_string()))?;
    plans(db)
        .update_one(doc! { "_id": plan_id }, doc! { "$set": set })
        .await?;
    find_plan(db, plan_id).await
}

/// Deletes a plan with its likes, saves and comments.
pub async fn delete_plan(db: &Database, plan_id: ObjectId) -> Result<(), ApiError> {
    let related = doc! { "plan_id": plan_id };
    db.collection::<Document>(PLAN_LIKES)
        .delete_many(related.clone())
        .await?;
    db.collection::<Document>(PLAN_SAVES)
        .delete_many(related.clone())
        .await?;
    db.collection::<Document>(PLAN_COMMENTS)
        .delete_many(related)
        .await?;
    plans(db).delete_one(doc! { "_id": plan_id }).await?;
    log::info!("Deleted plan {}", plan_id);
    Ok(())
}

/// Adds or removes the user's like/save. The counter moves only when a row
/// was actually inserted or deleted and never drops below zero. Returns the
/// resulting counter.
pub async fn set_reaction(
    db: &Database,
    reaction: Reaction,
    user: ObjectId,
    plan_id: ObjectId,
    active: bool,
) -> Result<i64, ApiError> {
    let rows = db.collection::<PlanLike>(reaction.collection());
    let counter = reaction.counter();

    if active {
        let row = PlanLike {
            id: None,
            user_id: user,
            plan_id,
            created_at: bson::DateTime::now(),
        };
        match rows.insert_one(&row).await {
            Ok(_) => {
                plans(db)
                    .update_one(doc! { "_id": plan_id }, doc! { "$inc": { counter: 1 } })
                    .await?;
            }
            Err(err) if is_duplicate_key(&err) => {}
            Err(err) => return Err(err.into()),
        }
    } else {
        let deleted = rows
            .delete_one(doc! { "user_id": user, "plan_id": plan_id })
            .await?;
        if deleted.deleted_count > 0 {
            plans(db)
                .update_one(
                    doc! { "_id": plan_id, counter: { "$gt": 0 } },
                    doc! { "$inc": { counter: -1 } },
                )
                .await?;
        }
    }

    let plan = find_plan(db, plan_id).await?;
    Ok(match reaction {
        Reaction::Like => plan.likes_count,
        Reaction::Save => plan.saves_count,
    })
}

pub async fn viewer_state(
    db: &Database,
    plan: &Plan,
    viewer: Option<ObjectId>,
) -> Result<Option<ViewerState>, ApiError> {
    let (Some(user), Some(plan_id)) = (viewer, plan.id) else {
        return Ok(None);
    };
    let filter = doc! { "user_id": user, "plan_id": plan_id };
    let liked = db
        .collection::<Document>(PLAN_LIKES)
        .count_documents(filter.clone())
        .await?
        > 0;
    let saved = db
        .collection::<Document>(PLAN_SAVES)
        .count_documents(filter)
        .await?
        > 0;
    Ok(Some(ViewerState {
        is_owner: plan.owner_id == user,
        liked,
        saved,
    }))
}

pub async fn list_comments(db: &Database, plan_id: ObjectId) -> Result<Vec<PlanComment>, ApiError> {
    let cursor = db
        .collection::<PlanComment>(PLAN_COMMENTS)
        .find(doc! { "plan_id": plan_id })
        .sort(doc! { "created_at": 1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn add_comment(
    db: &Database,
    plan_id: ObjectId,
    author: &AuthenticatedUser,
    body: &str,
) -> Result<PlanComment, ApiError> {
    let mut comment = PlanComment {
        id: None,
        plan_id,
        author_id: author.user_id,
        author_username: author.username.clone(),
        body: validate_comment(body)?,
        created_at: bson::DateTime::now(),
    };
    let result = db
        .collection::<PlanComment>(PLAN_COMMENTS)
        .insert_one(&comment)
        .await?;
    comment.id = result.inserted_id.as_object_id();
    Ok(comment)
}

pub async fn delete_comment(
    db: &Database,
    plan: &Plan,
    comment_id: ObjectId,
    user: ObjectId,
) -> Result<(), ApiError> {
    let comments = db.collection::<PlanComment>(PLAN_COMMENTS);
    let comment = comments
        .find_one(doc! { "_id": comment_id, "plan_id": plan.id })
        .await?
        .ok_or_else(|| ApiError::not_found("Comentario no encontrado."))?;
    if !can_delete_comment(&comment, plan, user) {
        return Err(ApiError::forbidden("No puedes borrar este comentario."));
    }
    comments.delete_one(doc! { "_id": comment_id }).await?;
    Ok(())
}
