use actix_web::{web, HttpResponse};

use crate::errors::ApiError;
use crate::models::generation::Coordinates;
use crate::services::geolocation_service::GeolocationService;

pub async fn resolve(
    geolocation: web::Data<GeolocationService>,
    input: web::Json<Coordinates>,
) -> Result<HttpResponse, ApiError> {
    if input.lat.is_none() || input.lng.is_none() {
        return Err(ApiError::bad_request("lat y lng son obligatorios."));
    }

    let location = geolocation
        .resolve_city_from_coordinates(input.lat, input.lng)
        .await
        .map_err(|e| ApiError::Upstream {
            message: e.to_string(),
            debug: None,
        })?
        .ok_or_else(|| ApiError::not_found("No pudimos determinar tu ciudad."))?;
    Ok(HttpResponse::Ok().json(location))
}
