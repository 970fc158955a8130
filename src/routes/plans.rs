use actix_web::{web, HttpResponse};
use mongodb::{bson::oid::ObjectId, Database};

use crate::errors::ApiError;
use crate::middleware::auth_context::{AuthenticatedUser, OptionalUser};
use crate::models::plan::{
    CommentInput, CommentView, FeedQuery, LikeResponse, PlanUpdate, PlanView, SaveResponse,
};
use crate::services::plan_service::{self, Reaction};
use crate::slug::slugify;

fn plan_id(raw: &str) -> Result<ObjectId, ApiError> {
    Ok(ObjectId::parse_str(raw)?)
}

pub async fn mine(user: AuthenticatedUser, db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let plans = plan_service::list_mine(&db, user.user_id).await?;
    Ok(HttpResponse::Ok().json(plans.iter().map(PlanView::summary).collect::<Vec<_>>()))
}

pub async fn feed(
    db: web::Data<Database>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, ApiError> {
    let city_slug = query.city.as_deref().map(slugify);
    let plans = plan_service::list_feed(&db, city_slug.as_deref()).await?;
    Ok(HttpResponse::Ok().json(plans.iter().map(PlanView::summary).collect::<Vec<_>>()))
}

pub async fn saved(user: AuthenticatedUser, db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let plans = plan_service::list_saved(&db, user.user_id).await?;
    Ok(HttpResponse::Ok().json(plans.iter().map(PlanView::summary).collect::<Vec<_>>()))
}

pub async fn detail(
    viewer: OptionalUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let plan = plan_service::find_visible(&db, plan_id(&path)?, viewer.user_id()).await?;
    let state = plan_service::viewer_state(&db, &plan, viewer.user_id()).await?;
    Ok(HttpResponse::Ok().json(PlanView::detail(&plan, state)))
}

pub async fn by_share_code(
    viewer: OptionalUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let plan = plan_service::find_by_share_code(&db, &path).await?;
    let state = plan_service::viewer_state(&db, &plan, viewer.user_id()).await?;
    Ok(HttpResponse::Ok().json(PlanView::detail(&plan, state)))
}

pub async fn update(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    input: web::Json<PlanUpdate>,
) -> Result<HttpResponse, ApiError> {
    let plan = plan_service::find_owned(&db, plan_id(&path)?, user.user_id).await?;
    let plan = plan_service::update_plan(&db, &plan, input.into_inner()).await?;
    let state = plan_service::viewer_state(&db, &plan, Some(user.user_id)).await?;
    Ok(HttpResponse::Ok().json(PlanView::detail(&plan, state)))
}

pub async fn delete(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = plan_id(&path)?;
    plan_service::find_owned(&db, id, user.user_id).await?;
    plan_service::delete_plan(&db, id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn react(
    user: &AuthenticatedUser,
    db: &Database,
    raw_id: &str,
    reaction: Reaction,
    active: bool,
) -> Result<i64, ApiError> {
    let id = plan_id(raw_id)?;
    plan_service::find_visible(db, id, Some(user.user_id)).await?;
    plan_service::set_reaction(db, reaction, user.user_id, id, active).await
}

pub async fn like(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let likes_count = react(&user, &db, &path, Reaction::Like, true).await?;
    Ok(HttpResponse::Ok().json(LikeResponse {
        liked: true,
        likes_count,
    }))
}

pub async fn unlike(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let likes_count = react(&user, &db, &path, Reaction::Like, false).await?;
    Ok(HttpResponse::Ok().json(LikeResponse {
        liked: false,
        likes_count,
    }))
}

pub async fn save(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let saves_count = react(&user, &db, &path, Reaction::Save, true).await?;
    Ok(HttpResponse::Ok().json(SaveResponse {
        saved: true,
        saves_count,
    }))
}

pub async fn unsave(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let saves_count = react(&user, &db, &path, Reaction::Save, false).await?;
    Ok(HttpResponse::Ok().json(SaveResponse {
        saved: false,
        saves_count,
    }))
}

pub async fn comments(
    viewer: OptionalUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let plan = plan_service::find_visible(&db, plan_id(&path)?, viewer.user_id()).await?;
    let plan_id = plan.id.ok_or_else(|| ApiError::Internal("Plan without id".to_string()))?;
    let comments = plan_service::list_comments(&db, plan_id).await?;
    Ok(HttpResponse::Ok().json(comments.iter().map(CommentView::from).collect::<Vec<_>>()))
}

pub async fn add_comment(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    input: web::Json<CommentInput>,
) -> Result<HttpResponse, ApiError> {
    let body = plan_service::validate_comment(&input.body)?;
    let id = plan_id(&path)?;
    plan_service::find_visible(&db, id, Some(user.user_id)).await?;
    let comment = plan_service::add_comment(&db, id, &user, &body).await?;
    Ok(HttpResponse::Created().json(CommentView::from(&comment)))
}

pub async fn delete_comment(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (raw_plan, raw_comment) = path.into_inner();
    let comment_id = ObjectId::parse_str(&raw_comment)?;
    let plan = plan_service::find_visible(&db, plan_id(&raw_plan)?, Some(user.user_id)).await?;
    plan_service::delete_comment(&db, &plan, comment_id, user.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
