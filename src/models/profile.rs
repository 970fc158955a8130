use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::generation::UserPreferences;

pub const DEFAULT_MAX_DISTANCE_KM: i64 = 8;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Vibe {
    Chill,
    Foodie,
    Cultural,
    Adventure,
    RumbaSuave,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UserProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub display_name: String,
    pub username_slug: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub city_default: String,
    #[serde(default)]
    pub city_slug: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub instagram: String,

    #[serde(default)]
    pub likes_tags: Vec<String>,
    #[serde(default)]
    pub hobbies_tags: Vec<String>,
    #[serde(default)]
    pub avoid_tags: Vec<String>,
    pub budget_min_cop: Option<i64>,
    pub budget_max_cop: Option<i64>,
    #[serde(default = "default_max_distance")]
    pub max_distance_km: i64,
    #[serde(default)]
    pub preferred_vibes: Vec<Vibe>,

    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "default_true")]
    pub show_city: bool,
    #[serde(default = "default_true")]
    pub show_tags: bool,
    #[serde(default = "default_true")]
    pub allow_friend_requests: bool,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl UserProfile {
    pub fn new(user_id: ObjectId, display_name: &str, username_slug: &str) -> Self {
        let now = bson::DateTime::now();
        Self {
            id: None,
            user_id,
            display_name: display_name.to_string(),
            username_slug: username_slug.to_string(),
            about: String::new(),
            bio: String::new(),
            country: String::new(),
            city: String::new(),
            city_default: String::new(),
            city_slug: String::new(),
            website: String::new(),
            instagram: String::new(),
            likes_tags: Vec::new(),
            hobbies_tags: Vec::new(),
            avoid_tags: Vec::new(),
            budget_min_cop: None,
            budget_max_cop: None,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            preferred_vibes: Vec::new(),
            is_private: false,
            show_city: true,
            show_tags: true,
            allow_friend_requests: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// City used when a request carries no location: the current city wins
    /// over the default one.
    pub fn city_reference(&self) -> Option<&str> {
        [self.city.as_str(), self.city_default.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|city| !city.is_empty())
    }

    pub fn preferences(&self) -> UserPreferences {
        UserPreferences {
            likes: self
                .likes_tags
                .iter()
                .chain(self.hobbies_tags.iter())
                .cloned()
                .collect(),
            avoid: self.avoid_tags.clone(),
            preferred_vibes: self
                .preferred_vibes
                .iter()
                .map(|vibe| vibe.as_str().to_string())
                .collect(),
            budget_min_cop: self.budget_min_cop,
            budget_max_cop: self.budget_max_cop,
            max_distance_km: (self.max_distance_km != DEFAULT_MAX_DISTANCE_KM)
                .then_some(self.max_distance_km),
            city: self.city_reference().map(str::to_string),
        }
    }
}

impl Vibe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vibe::Chill => "chill",
            Vibe::Foodie => "foodie",
            Vibe::Cultural => "cultural",
            Vibe::Adventure => "adventure",
            Vibe::RumbaSuave => "rumba suave",
        }
    }
}

/// Partial update for `PUT /api/profile`; absent fields are left untouched.
#[derive(Debug, Deserialize, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub bio: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub city_default: Option<String>,
    pub website: Option<String>,
    pub instagram: Option<String>,
    pub likes_tags: Option<Vec<String>>,
    pub hobbies_tags: Option<Vec<String>>,
    pub avoid_tags: Option<Vec<String>>,
    // `null` clears the bound, absence keeps it.
    #[serde(default, deserialize_with = "explicit_null")]
    pub budget_min_cop: Option<Option<i64>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub budget_max_cop: Option<Option<i64>>,
    pub max_distance_km: Option<i64>,
    pub preferred_vibes: Option<Vec<Vibe>>,
    pub is_private: Option<bool>,
    pub show_city: Option<bool>,
    pub show_tags: Option<bool>,
    pub allow_friend_requests: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    #[serde(rename = "self")]
    Myself,
    Friends,
    RequestSent,
    RequestReceived,
    None,
}

/// Profile as rendered to a viewer; hidden sections are `None`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileView {
    pub user_id: String,
    pub display_name: String,
    pub username_slug: String,
    pub relationship: Relationship,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProfileDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub about: String,
    pub bio: String,
    pub website: String,
    pub instagram: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hobbies_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_vibes: Option<Vec<Vibe>>,
    pub created_at: DateTime<Utc>,
}

/// The owner's view of their profile, settings included.
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnProfileView {
    pub user_id: String,
    pub display_name: String,
    pub username_slug: String,
    pub about: String,
    pub bio: String,
    pub country: String,
    pub city: String,
    pub city_default: String,
    pub city_slug: String,
    pub website: String,
    pub instagram: String,
    pub likes_tags: Vec<String>,
    pub hobbies_tags: Vec<String>,
    pub avoid_tags: Vec<String>,
    pub budget_min_cop: Option<i64>,
    pub budget_max_cop: Option<i64>,
    pub max_distance_km: i64,
    pub preferred_vibes: Vec<Vibe>,
    pub is_private: bool,
    pub show_city: bool,
    pub show_tags: bool,
    pub allow_friend_requests: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserProfile> for OwnProfileView {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id.to_hex(),
            display_name: profile.display_name.clone(),
            username_slug: profile.username_slug.clone(),
            about: profile.about.clone(),
            bio: profile.bio.clone(),
            country: profile.country.clone(),
            city: profile.city.clone(),
            city_default: profile.city_default.clone(),
            city_slug: profile.city_slug.clone(),
            website: profile.website.clone(),
            instagram: profile.instagram.clone(),
            likes_tags: profile.likes_tags.clone(),
            hobbies_tags: profile.hobbies_tags.clone(),
            avoid_tags: profile.avoid_tags.clone(),
            budget_min_cop: profile.budget_min_cop,
            budget_max_cop: profile.budget_max_cop,
            max_distance_km: profile.max_distance_km,
            preferred_vibes: profile.preferred_vibes.clone(),
            is_private: profile.is_private,
            show_city: profile.show_city,
            show_tags: profile.show_tags,
            allow_friend_requests: profile.allow_friend_requests,
            created_at: profile.created_at.to_chrono(),
            updated_at: profile.updated_at.to_chrono(),
        }
    }
}

fn default_max_distance() -> i64 {
    DEFAULT_MAX_DISTANCE_KM
}

fn default_true() -> bool {
    true
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: ProfileUpdate =
            serde_json::from_value(json!({ "budget_min_cop": null })).unwrap();
        assert_eq!(update.budget_min_cop, Some(None));
        assert_eq!(update.budget_max_cop, None);
    }

    #[test]
    fn test_city_reference_prefers_current_city() {
        let mut profile = UserProfile::new(ObjectId::new(), "Ana", "ana");
        assert_eq!(profile.city_reference(), None);

        profile.city_default = "Bogotá".to_string();
        assert_eq!(profile.city_reference(), Some("Bogotá"));

        profile.city = " Medellín ".to_string();
        assert_eq!(profile.city_reference(), Some("Medellín"));
    }

    #[test]
    fn test_preferences_merge_likes_and_hobbies() {
        let mut profile = UserProfile::new(ObjectId::new(), "Ana", "ana");
        profile.likes_tags = vec!["café".to_string()];
        profile.hobbies_tags = vec!["arte".to_string()];
        profile.preferred_vibes = vec![Vibe::RumbaSuave];

        let preferences = profile.preferences();
        assert_eq!(preferences.likes, vec!["café", "arte"]);
        assert_eq!(preferences.preferred_vibes, vec!["rumba suave"]);
        assert_eq!(preferences.max_distance_km, None);
    }

    #[test]
    fn test_default_profile_adds_no_preferences() {
        let mut profile = UserProfile::new(ObjectId::new(), "Ana", "ana");
        assert!(profile.preferences().is_empty());

        profile.max_distance_km = 3;
        let preferences = profile.preferences();
        assert_eq!(preferences.max_distance_km, Some(3));
        assert!(!preferences.is_empty());
    }
}
