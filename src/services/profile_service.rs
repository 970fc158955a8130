use mongodb::{
    bson::{self, doc, oid::ObjectId},
    Collection, Database,
};
use std::collections::HashSet;

use crate::db::mongo::{is_duplicate_key, PROFILES};
use crate::errors::ApiError;
use crate::models::generation::UserPreferences;
use crate::models::profile::{
    ProfileDetails, ProfileUpdate, ProfileView, Relationship, UserProfile,
};
use crate::slug::slugify;

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 24;
pub const MAX_DISPLAY_NAME_CHARS: usize = 60;
pub const MAX_ABOUT_CHARS: usize = 160;
const SLUG_ATTEMPTS: u32 = 50;

/// Trims, truncates and case-insensitively dedups tags, keeping the first
/// spelling of each.
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|tag| tag.trim().chars().take(MAX_TAG_CHARS).collect::<String>())
        .map(|tag| tag.trim_end().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

fn bounded(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{} no puede superar {} caracteres.",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Applies a partial update in place after validating it.
pub fn apply_update(profile: &mut UserProfile, update: ProfileUpdate) -> Result<(), ApiError> {
    if let Some(name) = update.display_name {
        let name = bounded("display_name", &name, MAX_DISPLAY_NAME_CHARS)?;
        if name.is_empty() {
            return Err(ApiError::bad_request("display_name no puede estar vacío."));
        }
        profile.display_name = name;
    }
    if let Some(about) = update.about {
        profile.about = bounded("about", &about, MAX_ABOUT_CHARS)?;
    }
    if let Some(bio) = update.bio {
        profile.bio = bio.trim().to_string();
    }
    if let Some(country) = update.country {
        profile.country = country.trim().to_string();
    }
    if let Some(city) = update.city {
        profile.city = city.trim().to_string();
    }
    if let Some(city_default) = update.city_default {
        profile.city_default = city_default.trim().to_string();
    }
    if let Some(website) = update.website {
        profile.website = website.trim().to_string();
    }
    if let Some(instagram) = update.instagram {
        profile.instagram = instagram.trim().trim_start_matches('@').to_string();
    }

    if let Some(tags) = update.likes_tags {
        profile.likes_tags = sanitize_tags(&tags);
    }
    if let Some(tags) = update.hobbies_tags {
        profile.hobbies_tags = sanitize_tags(&tags);
    }
    if let Some(tags) = update.avoid_tags {
        profile.avoid_tags = sanitize_tags(&tags);
    }

    if let Some(min) = update.budget_min_cop {
        profile.budget_min_cop = min;
    }
    if let Some(max) = update.budget_max_cop {
        profile.budget_max_cop = max;
    }
    if [profile.budget_min_cop, profile.budget_max_cop]
        .iter()
        .flatten()
        .any(|value| *value < 0)
    {
        return Err(ApiError::bad_request("El presupuesto no puede ser negativo."));
    }
    if let (Some(min), Some(max)) = (profile.budget_min_cop, profile.budget_max_cop) {
        if min > max {
            return Err(ApiError::bad_request(
                "budget_min_cop no puede ser mayor que budget_max_cop.",
            ));
        }
    }

    if let Some(distance) = update.max_distance_km {
        if distance <= 0 {
            return Err(ApiError::bad_request("max_distance_km debe ser positivo."));
        }
        profile.max_distance_km = distance;
    }
    if let Some(vibes) = update.preferred_vibes {
        let mut unique = Vec::with_capacity(vibes.len());
        for vibe in vibes {
            if !unique.contains(&vibe) {
                unique.push(vibe);
            }
        }
        profile.preferred_vibes = unique;
    }

    if let Some(is_private) = update.is_private {
        profile.is_private = is_private;
    }
    if let Some(show_city) = update.show_city {
        profile.show_city = show_city;
    }
    if let Some(show_tags) = update.show_tags {
        profile.show_tags = show_tags;
    }
    if let Some(allow) = update.allow_friend_requests {
        profile.allow_friend_requests = allow;
    }

    profile.city_slug = profile.city_reference().map(slugify).unwrap_or_default();
    profile.updated_at = bson::DateTime::now();
    Ok(())
}

/// Renders the profile for a viewer with the given relationship.
pub fn build_view(profile: &UserProfile, relationship: Relationship) -> ProfileView {
    let full_access = matches!(relationship, Relationship::Myself | Relationship::Friends);
    let details = (full_access || !profile.is_private).then(|| {
        let show_city = full_access || profile.show_city;
        let show_tags = full_access || profile.show_tags;
        ProfileDetails {
            about: profile.about.clone(),
            bio: profile.bio.clone(),
            website: profile.website.clone(),
            instagram: profile.instagram.clone(),
            country: show_city.then(|| profile.country.clone()),
            city: show_city.then(|| profile.city_reference().unwrap_or_default().to_string()),
            likes_tags: show_tags.then(|| profile.likes_tags.clone()),
            hobbies_tags: show_tags.then(|| profile.hobbies_tags.clone()),
            preferred_vibes: show_tags.then(|| profile.preferred_vibes.clone()),
            created_at: profile.created_at.to_chrono(),
        }
    });

    ProfileView {
        user_id: profile.user_id.to_hex(),
        display_name: profile.display_name.clone(),
        username_slug: profile.username_slug.clone(),
        relationship,
        is_private: profile.is_private,
        details,
    }
}

fn profiles(db: &Database) -> Collection<UserProfile> {
    db.collection(PROFILES)
}

pub async fn find_by_user(db: &Database, user_id: ObjectId) -> Result<Option<UserProfile>, ApiError> {
    Ok(profiles(db).find_one(doc! { "user_id": user_id }).await?)
}

pub async fn find_by_slug(db: &Database, slug: &str) -> Result<UserProfile, ApiError> {
    profiles(db)
        .find_one(doc! { "username_slug": slugify(slug) })
        .await?
        .ok_or_else(|| ApiError::not_found("Perfil no encontrado."))
}

/// Creates the profile of a user with a unique slug derived from the username.
pub async fn create_for_user(
    db: &Database,
    user_id: ObjectId,
    username: &str,
) -> Result<UserProfile, ApiError> {
    let base = match slugify(username) {
        slug if slug.is_empty() => "usuario".to_string(),
        slug => slug,
    };

    for attempt in 1..=SLUG_ATTEMPTS {
        let slug = if attempt == 1 {
            base.clone()
        } else {
            format!("{}-{}", base, attempt)
        };
        let mut profile = UserProfile::new(user_id, username, &slug);
        match profiles(db).insert_one(&profile).await {
            Ok(result) => {
                profile.id = result.inserted_id.as_object_id();
                return Ok(profile);
            }
            Err(err) if is_duplicate_key(&err) => {
                // Another profile for this user wins over a slug retry.
                if let Some(existing) = find_by_user(db, user_id).await? {
                    return Ok(existing);
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(ApiError::conflict("No fue posible generar un slug único."))
}

pub async fn get_or_create(
    db: &Database,
    user_id: ObjectId,
    username: &str,
) -> Result<UserProfile, ApiError> {
    match find_by_user(db, user_id).await? {
        Some(profile) => Ok(profile),
        None => create_for_user(db, user_id, username).await,
    }
}

pub async fn save(db: &Database, profile: &UserProfile) -> Result<(), ApiError> {
    profiles(db)
        .replace_one(doc! { "user_id": profile.user_id }, profile)
        .await?;
    Ok(())
}

/// Planning context for a user; empty when no profile exists yet.
pub async fn preferences_for(db: &Database, user_id: ObjectId) -> Result<UserPreferences, ApiError> {
    Ok(find_by_user(db, user_id)
        .await?
        .map(|profile| profile.preferences())
        .unwrap_or_default())
}
