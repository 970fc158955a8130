use actix_web::{web, HttpResponse};
use mongodb::Database;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::db::mongo::verify_connection;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub services: BTreeMap<String, ServiceStatus>,
    pub environment: String,
    pub version: String,
}

#[derive(Serialize, Clone)]
pub struct ServiceStatus {
    pub status: String,
    pub details: Option<String>,
}

impl ServiceStatus {
    fn ok(details: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            details: Some(details.into()),
        }
    }

    fn error(details: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            details: Some(details.into()),
        }
    }
}

pub async fn health_check(db: web::Data<Database>, config: web::Data<AppConfig>) -> HttpResponse {
    let mut services = BTreeMap::new();

    let mongodb = if verify_connection(&db).await {
        ServiceStatus::ok("Connected successfully to MongoDB")
    } else {
        ServiceStatus::error("MongoDB ping failed")
    };
    services.insert("mongodb".to_string(), mongodb);
    services.insert(
        "openrouter".to_string(),
        key_status("OPENROUTER_API_KEY", &config.openrouter.api_key),
    );
    services.insert(
        "google_places".to_string(),
        key_status("GOOGLE_PLACES_API_KEY", &config.google_places_api_key),
    );

    let degraded = services.values().any(|service| service.status != "ok");
    HttpResponse::Ok().json(HealthStatus {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        services,
        environment: config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn key_status(name: &str, key: &str) -> ServiceStatus {
    if key.is_empty() {
        return ServiceStatus::error(format!("{} not configured", name));
    }
    ServiceStatus::ok(format!("{} configured", name))
}
