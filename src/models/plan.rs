use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::generation::{Itinerary, ItineraryBlock, ItineraryStep};

pub const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Plan {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner_id: ObjectId,
    pub owner_username: String,
    pub title: String,
    pub city: String,
    pub city_slug: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub group: String,
    pub budget_cop: Option<i64>,
    pub prompt_text: String,
    pub plan_json: Value,
    pub items: Vec<PlanItem>,
    pub is_public: bool,
    pub share_code: String,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub saves_count: i64,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

/// One stop of a persisted itinerary.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlanItem {
    pub time_label: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    pub order: u32,
    pub place_id: String,
    pub name: String,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub photo_reference: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub maps_url: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub description: String,
    pub est_time_minutes: Option<u32>,
    pub est_cost_cop: Option<i64>,
}

impl PlanItem {
    pub fn from_step(block: &ItineraryBlock, step: &ItineraryStep) -> Self {
        Self {
            time_label: block.label.clone(),
            start: block.start.clone(),
            end: block.end.clone(),
            order: step.order,
            place_id: step.place_id.clone(),
            name: step.name.clone(),
            rating: step.rating,
            user_ratings_total: step.user_ratings_total,
            price_level: step.price_level,
            address: step.address.clone(),
            photo_reference: step.photo_reference.clone().unwrap_or_default(),
            photo_url: step.photo_url.clone(),
            maps_url: step.maps_url.clone(),
            why: step.why.clone(),
            description: step.description.clone(),
            est_time_minutes: step.estimated_time_minutes,
            est_cost_cop: step.estimated_cost_cop,
        }
    }

    pub fn from_itinerary(itinerary: &Itinerary) -> Vec<Self> {
        let mut items: Vec<Self> = itinerary
            .steps()
            .map(|(block, step)| Self::from_step(block, step))
            .collect();
        items.sort_by_key(|item| item.order);
        items
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlanLike {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub plan_id: ObjectId,
    pub created_at: bson::DateTime,
}

/// Bookmark of a plan by a user; same shape as a like, separate collection.
pub type PlanSave = PlanLike;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlanComment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub plan_id: ObjectId,
    pub author_id: ObjectId,
    pub author_username: String,
    pub body: String,
    pub created_at: bson::DateTime,
}

#[derive(Debug, Deserialize)]
pub struct PlanUpdate {
    pub title: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CommentInput {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub city: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanView {
    pub id: String,
    pub owner_id: String,
    pub owner_username: String,
    pub title: String,
    pub city: String,
    pub city_slug: String,
    pub mood: String,
    pub group: String,
    pub budget_cop: Option<i64>,
    pub items: Vec<PlanItem>,
    pub is_public: bool,
    pub share_code: String,
    pub likes_count: i64,
    pub saves_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct ViewerState {
    pub is_owner: bool,
    pub liked: bool,
    pub saved: bool,
}

impl PlanView {
    /// Listing shape: no prompt text or raw generation payload.
    pub fn summary(plan: &Plan) -> Self {
        Self {
            id: plan.id.map(|id| id.to_hex()).unwrap_or_default(),
            owner_id: plan.owner_id.to_hex(),
            owner_username: plan.owner_username.clone(),
            title: plan.title.clone(),
            city: plan.city.clone(),
            city_slug: plan.city_slug.clone(),
            mood: plan.mood.clone(),
            group: plan.group.clone(),
            budget_cop: plan.budget_cop,
            items: plan.items.clone(),
            is_public: plan.is_public,
            share_code: plan.share_code.clone(),
            likes_count: plan.likes_count,
            saves_count: plan.saves_count,
            created_at: plan.created_at.to_chrono(),
            updated_at: plan.updated_at.to_chrono(),
            prompt_text: None,
            plan_json: None,
            viewer: None,
        }
    }

    pub fn detail(plan: &Plan, viewer: Option<ViewerState>) -> Self {
        let mut view = Self::summary(plan);
        view.prompt_text = Some(plan.prompt_text.clone());
        view.plan_json = Some(plan.plan_json.clone());
        view.viewer = viewer;
        view
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub plan_id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PlanComment> for CommentView {
    fn from(comment: &PlanComment) -> Self {
        Self {
            id: comment.id.map(|id| id.to_hex()).unwrap_or_default(),
            plan_id: comment.plan_id.to_hex(),
            author_id: comment.author_id.to_hex(),
            author_username: comment.author_username.clone(),
            body: comment.body.clone(),
            created_at: comment.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveResponse {
    pub saved: bool,
    pub saves_count: i64,
}
