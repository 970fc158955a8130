use actix_web::{web, HttpResponse};
use mongodb::{bson::oid::ObjectId, Database};

use crate::errors::ApiError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::social::{MessageInput, MessageView, PollQuery};
use crate::services::chat_service;

pub async fn send_message(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    input: web::Json<MessageInput>,
) -> Result<HttpResponse, ApiError> {
    let friend = ObjectId::parse_str(path.as_str())?;
    let message = chat_service::send_message(&db, user.user_id, friend, &input.body).await?;
    Ok(HttpResponse::Created().json(MessageView::from(&message)))
}

pub async fn poll_messages(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    query: web::Query<PollQuery>,
) -> Result<HttpResponse, ApiError> {
    let friend = ObjectId::parse_str(path.as_str())?;
    let messages = chat_service::poll(&db, user.user_id, friend, query.after).await?;
    Ok(HttpResponse::Ok().json(messages.iter().map(MessageView::from).collect::<Vec<_>>()))
}

pub async fn conversations(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(chat_service::conversations(&db, user.user_id).await?))
}
