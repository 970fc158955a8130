use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, Error, FromRequest, HttpMessage, HttpRequest};
use mongodb::bson::oid::ObjectId;

use crate::{
    config::AppConfig,
    errors::ApiError,
    middleware::auth::{bearer_token, decode_token, Claims},
};

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: ObjectId,
    pub email: String,
    pub username: String,
}

impl TryFrom<&Claims> for AuthenticatedUser {
    type Error = ApiError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        let user_id = ObjectId::parse_str(&claims.user_id)
            .map_err(|_| ApiError::Unauthorized("Invalid user ID".to_string()))?;
        Ok(AuthenticatedUser {
            user_id,
            email: claims.sub.clone(),
            username: claims.username.clone(),
        })
    }
}

/// Claims stored by `AuthMiddleware`, or decoded from the bearer header on
/// routes the middleware does not wrap.
fn request_claims(req: &HttpRequest) -> Option<Claims> {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return Some(claims.clone());
    }
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .zip(req.app_data::<web::Data<AppConfig>>())
        .and_then(|(token, config)| decode_token(token, &config.jwt_secret).ok())
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = match request_claims(req) {
            Some(claims) => AuthenticatedUser::try_from(&claims).map_err(Error::from),
            None => Err(ApiError::Unauthorized("User not authenticated".to_string()).into()),
        };
        ready(result)
    }
}

/// Identity on public routes: a valid bearer token personalises the response,
/// a missing or invalid one degrades to an anonymous viewer.
#[derive(Clone, Debug)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

impl OptionalUser {
    pub fn user_id(&self) -> Option<ObjectId> {
        self.0.as_ref().map(|user| user.user_id)
    }
}

impl FromRequest for OptionalUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = request_claims(req).and_then(|claims| AuthenticatedUser::try_from(&claims).ok());
        ready(Ok(OptionalUser(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::generate_token;
    use actix_web::test::TestRequest;

    const SECRET: &str = "extractor-secret";

    fn config() -> web::Data<AppConfig> {
        web::Data::new(AppConfig {
            jwt_secret: SECRET.to_string(),
            ..AppConfig::default()
        })
    }

    #[actix_rt::test]
    async fn test_authenticated_user_from_header() {
        let user_id = ObjectId::new();
        let token = generate_token(SECRET, "ana@example.com", "ana", user_id).unwrap();
        let req = TestRequest::default()
            .app_data(config())
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.username, "ana");
    }

    #[actix_rt::test]
    async fn test_missing_token_rejects_or_degrades() {
        let req = TestRequest::default().app_data(config()).to_http_request();
        assert!(AuthenticatedUser::extract(&req).await.is_err());
        assert!(OptionalUser::extract(&req).await.unwrap().0.is_none());

        let req = TestRequest::default()
            .app_data(config())
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_http_request();
        assert!(OptionalUser::extract(&req).await.unwrap().user_id().is_none());
    }
}
