use actix_web::{web, HttpResponse};
use mongodb::{bson::oid::ObjectId, Database};

use crate::errors::ApiError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::social::{FriendRequestInput, FriendRequestOutcome, FriendRequestView};
use crate::services::social_service::{self, RequestAction};

pub async fn send_request(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    input: web::Json<FriendRequestInput>,
) -> Result<HttpResponse, ApiError> {
    let (request, created) = social_service::send_request(&db, user.user_id, &input.to_username).await?;
    let outcome = FriendRequestOutcome {
        status: request.status,
        request_id: request.id.map(|id| id.to_hex()).unwrap_or_default(),
    };
    if created {
        Ok(HttpResponse::Created().json(outcome))
    } else {
        Ok(HttpResponse::Ok().json(outcome))
    }
}

async fn transition(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    action: RequestAction,
) -> Result<HttpResponse, ApiError> {
    let request_id = ObjectId::parse_str(path.as_str())?;
    let request = social_service::respond(&db, user.user_id, request_id, action).await?;
    Ok(HttpResponse::Ok().json(FriendRequestView::from(&request)))
}

pub async fn accept_request(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    transition(user, db, path, RequestAction::Accept).await
}

pub async fn reject_request(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    transition(user, db, path, RequestAction::Reject).await
}

pub async fn cancel_request(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    transition(user, db, path, RequestAction::Cancel).await
}

pub async fn list_requests(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(social_service::list_requests(&db, user.user_id).await?))
}

pub async fn list_friends(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(social_service::list_friends(&db, user.user_id).await?))
}

pub async fn remove_friend(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let other = ObjectId::parse_str(path.as_str())?;
    social_service::remove_friend(&db, user.user_id, other).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn counts(user: AuthenticatedUser, db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(social_service::counts(&db, user.user_id).await?))
}
