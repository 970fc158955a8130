#![allow(dead_code)]

use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    App,
};
use mongodb::{bson::oid::ObjectId, Client, Database};
use serde_json::Value;

use descubreme_api::{
    app::AppState,
    config::AppConfig,
    db::mongo::{create_mongo_client, ensure_indexes},
    middleware::auth::generate_token,
};

pub const JWT_SECRET: &str = "integration-test-secret";

// Unreachable-by-default store with short timeouts: tests only hit paths that
// fail before any query, and health reports the store as down.
const TEST_MONGO_URI: &str =
    "mongodb://127.0.0.1:27017/?serverSelectionTimeoutMS=300&connectTimeoutMS=300";

pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let client = Client::with_uri_str(TEST_MONGO_URI)
            .await
            .expect("test client options are valid");
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            database: "DescubremeTest".to_string(),
            environment: "test".to_string(),
            ..AppConfig::default()
        };
        let database = client.database(&config.database);
        let state = AppState::new(config, database).expect("clients build without network");
        Self { state }
    }

    /// App backed by the MongoDB at `MONGODB_URI`, on a fresh database with
    /// indexes applied. `None` when the variable is not set.
    pub async fn live() -> Option<Self> {
        let mongo_uri = std::env::var("MONGODB_URI").ok()?;
        let client = create_mongo_client(&mongo_uri)
            .await
            .expect("MONGODB_URI is reachable");
        let config = AppConfig {
            mongo_uri,
            jwt_secret: JWT_SECRET.to_string(),
            database: format!("descubreme_test_{}", ObjectId::new().to_hex()),
            environment: "test".to_string(),
            ..AppConfig::default()
        };
        let database = client.database(&config.database);
        ensure_indexes(&database).await.expect("indexes are created");
        let state = AppState::new(config, database).expect("clients build without network");
        Some(Self { state })
    }

    pub fn db(&self) -> &Database {
        &self.state.database
    }

    pub async fn cleanup(&self) {
        self.db().drop().await.expect("test database is dropped");
    }

    pub fn create_app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let state = self.state.clone();
        App::new().configure(move |cfg| state.configure(cfg))
    }
}

pub fn bearer(username: &str) -> (String, String) {
    let token = generate_token(
        JWT_SECRET,
        &format!("{}@example.com", username),
        username,
        ObjectId::new(),
    )
    .expect("token encodes");
    ("Authorization".to_string(), format!("Bearer {}", token))
}

pub async fn json_body<B: MessageBody>(response: ServiceResponse<B>) -> Value {
    let bytes = actix_web::body::to_bytes(response.into_body())
        .await
        .unwrap_or_default();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
