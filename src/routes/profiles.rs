use actix_web::{web, HttpResponse};
use mongodb::Database;

use crate::errors::ApiError;
use crate::middleware::auth_context::{AuthenticatedUser, OptionalUser};
use crate::models::profile::{OwnProfileView, ProfileUpdate};
use crate::services::{profile_service, social_service};

pub async fn get_profile(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let profile = profile_service::get_or_create(&db, user.user_id, &user.username).await?;
    Ok(HttpResponse::Ok().json(OwnProfileView::from(&profile)))
}

pub async fn update_profile(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    input: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let mut profile = profile_service::get_or_create(&db, user.user_id, &user.username).await?;
    profile_service::apply_update(&mut profile, input.into_inner())?;
    profile_service::save(&db, &profile).await?;
    Ok(HttpResponse::Ok().json(OwnProfileView::from(&profile)))
}

pub async fn public_profile(
    viewer: OptionalUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let profile = profile_service::find_by_slug(&db, &path.into_inner()).await?;
    let relationship = social_service::relationship(&db, viewer.user_id(), profile.user_id).await?;
    Ok(HttpResponse::Ok().json(profile_service::build_view(&profile, relationship)))
}
