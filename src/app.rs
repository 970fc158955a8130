use actix_web::web;
use mongodb::Database;
use thiserror::Error;

use crate::config::AppConfig;
use crate::routes;
use crate::services::geolocation_service::{GeolocationError, GeolocationService};
use crate::services::openrouter_service::{OpenRouterClient, OpenRouterError};
use crate::services::places_service::{GooglePlacesClient, PlacesError};
use crate::services::planner_service::PlanPipeline;

pub type Pipeline = PlanPipeline<OpenRouterClient, GooglePlacesClient>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to build OpenRouter client: {0}")]
    OpenRouter(#[from] OpenRouterError),
    #[error("Failed to build Places client: {0}")]
    Places(#[from] PlacesError),
    #[error("Failed to build geolocation client: {0}")]
    Geolocation(#[from] GeolocationError),
}

/// Shared application data, built once and cloned into every worker.
#[derive(Clone)]
pub struct AppState {
    pub database: web::Data<Database>,
    pub config: web::Data<AppConfig>,
    pub pipeline: web::Data<Pipeline>,
    pub geolocation: web::Data<GeolocationService>,
}

impl AppState {
    pub fn new(config: AppConfig, database: Database) -> Result<Self, StartupError> {
        let geolocation = GeolocationService::new(&config.google_places_api_key)?;
        let pipeline = PlanPipeline::new(
            OpenRouterClient::new(config.openrouter.clone())?,
            GooglePlacesClient::new(&config.google_places_api_key)?,
            Some(geolocation.clone()),
        );

        if !pipeline.model().is_configured() {
            log::warn!("OPENROUTER_API_KEY not set; plan generation will fail");
        }
        if !pipeline.places().is_configured() {
            log::warn!("GOOGLE_PLACES_API_KEY not set; place search will fail");
        }

        Ok(Self {
            database: web::Data::new(database),
            config: web::Data::new(config),
            pipeline: web::Data::new(pipeline),
            geolocation: web::Data::new(geolocation),
        })
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.database.clone())
            .app_data(self.config.clone())
            .app_data(self.pipeline.clone())
            .app_data(self.geolocation.clone())
            .app_data(web::JsonConfig::default().error_handler(routes::json_error));
        routes::configure(cfg);
    }
}
