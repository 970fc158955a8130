use actix_web::{web, HttpResponse};
use mongodb::{
    bson::{self, doc},
    Collection, Database,
};
use regex::Regex;

use crate::config::AppConfig;
use crate::db::mongo::{is_duplicate_key, USERS};
use crate::errors::ApiError;
use crate::middleware::auth::generate_token;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::user::{
    LoginInput, RegisterInput, RegisterResponse, TokenResponse, User, UserSession,
};
use crate::services::profile_service;

const MIN_PASSWORD_CHARS: usize = 8;

fn users(db: &Database) -> Collection<User> {
    db.collection(USERS)
}

pub async fn register(
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();
    let username = input.username.trim().to_string();
    let email = input.email.trim().to_lowercase();

    if !is_valid_username(&username) {
        return Err(ApiError::bad_request(
            "El usuario debe tener entre 3 y 30 caracteres: letras, números, _ . -",
        ));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Correo electrónico inválido."));
    }
    if input.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::bad_request(format!(
            "La contraseña debe tener al menos {} caracteres.",
            MIN_PASSWORD_CHARS
        )));
    }

    let password = bcrypt::hash(&input.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))?;
    let now = bson::DateTime::now();
    let user = User {
        id: None,
        username: username.clone(),
        email: email.clone(),
        password,
        last_signin: None,
        failed_signins: 0,
        created_at: now,
        updated_at: now,
    };

    let user_id = match users(&db).insert_one(&user).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal("Missing inserted user id".to_string()))?,
        Err(err) if is_duplicate_key(&err) => {
            return Err(ApiError::conflict("El usuario o correo ya existe."))
        }
        Err(err) => return Err(err.into()),
    };

    let profile = profile_service::create_for_user(&db, user_id, &username).await?;
    log::info!("Registered user {}", username);

    let token = generate_token(&config.jwt_secret, &email, &username, user_id)
        .map_err(|_| ApiError::Internal("Token generation failed".to_string()))?;
    Ok(HttpResponse::Created().json(RegisterResponse {
        auth_token: token,
        user: UserSession {
            id: user_id.to_hex(),
            username,
            email,
            display_name: profile.display_name,
            created_at: now.to_chrono(),
        },
    }))
}

pub async fn login(
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    input: web::Json<LoginInput>,
) -> Result<HttpResponse, ApiError> {
    let email = input.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("Credenciales inválidas.".to_string());

    let user = users(&db)
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(invalid)?;
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal("Unable to read user_id".to_string()))?;

    if !bcrypt::verify(&input.password, &user.password).unwrap_or(false) {
        users(&db)
            .update_one(
                doc! { "_id": user_id },
                doc! { "$inc": { "failed_signins": 1 } },
            )
            .await?;
        log::warn!("Failed sign-in for user {}", user.username);
        return Err(invalid());
    }

    users(&db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "last_signin": bson::DateTime::now(), "failed_signins": 0 } },
        )
        .await?;

    let token = generate_token(&config.jwt_secret, &user.email, &user.username, user_id)
        .map_err(|_| ApiError::Internal("Token generation failed".to_string()))?;
    Ok(HttpResponse::Ok().json(TokenResponse { auth_token: token }))
}

pub async fn session(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let account = users(&db)
        .find_one(doc! { "_id": user.user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado."))?;
    let profile = profile_service::get_or_create(&db, user.user_id, &account.username).await?;

    Ok(HttpResponse::Ok().json(UserSession {
        id: user.user_id.to_hex(),
        username: account.username,
        email: account.email,
        display_name: profile.display_name,
        created_at: account.created_at.to_chrono(),
    }))
}

fn is_valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.\-]{3,30}$")
        .map(|re| re.is_match(username))
        .unwrap_or(false)
}

fn is_valid_email(email: &str) -> bool {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*$",
    )
    .map(|re| re.is_match(email))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("ana"));
        assert!(is_valid_username("juan.perez-99_x"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username(&"a".repeat(31)));
        assert!(!is_valid_username("con espacio"));
        assert!(!is_valid_username("ñandú"));
    }

    #[test]
    fn test_email_rules() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@"));
        assert!(!is_valid_email("sin-arroba.com"));
    }
}
