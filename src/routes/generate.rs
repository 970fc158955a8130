use actix_web::{web, HttpResponse};
use mongodb::Database;
use serde_json::json;

use crate::app::Pipeline;
use crate::errors::ApiError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::generation::GenerateRequest;
use crate::services::intent_service::validate_prompt;
use crate::services::{plan_service, profile_service};

/// Runs the generation pipeline and stores the result as a private plan.
pub async fn generate_plan(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pipeline: web::Data<Pipeline>,
    input: web::Json<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = input.into_inner();
    validate_prompt(&request.prompt).map_err(ApiError::BadRequest)?;

    let preferences = profile_service::preferences_for(&db, user.user_id).await?;
    let generated = pipeline.generate(&request, &preferences).await?;

    let plan = plan_service::build_plan(&user, &request.prompt, &generated)?;
    let plan = plan_service::insert_plan(&db, plan).await?;

    let mut body = serde_json::to_value(&generated)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize plan: {}", e)))?;
    body["plan_id"] = json!(plan.id.map(|id| id.to_hex()));
    body["share_code"] = json!(plan.share_code);
    Ok(HttpResponse::Ok().json(body))
}
