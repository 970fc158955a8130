use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::generation::{ResolvedLocation, DEFAULT_COUNTRY};
use crate::slug::slugify;

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const USER_AGENT: &str = "DescubremeBot/1.0";
const REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CITY: &str = "Colombia";

#[derive(Debug, Error)]
pub enum GeolocationError {
    #[error("No fue posible resolver la ciudad por GPS: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    #[serde(default)]
    long_name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    municipality: Option<String>,
    state_district: Option<String>,
    country_code: Option<String>,
}

#[derive(Clone)]
pub struct GeolocationService {
    client: Client,
    google_api_key: String,
}

impl GeolocationService {
    pub fn new(google_api_key: &str) -> Result<Self, GeolocationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            google_api_key: google_api_key.to_string(),
        })
    }

    /// Reverse geocodes coordinates to a city, trying Google first (when a key
    /// is configured) and Nominatim second.
    pub async fn resolve_city_from_coordinates(
        &self,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Option<ResolvedLocation>, GeolocationError> {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Ok(None);
        };
        if !valid_coordinates(lat, lng) {
            log::warn!("Ignoring out-of-range coordinates ({}, {})", lat, lng);
            return Ok(None);
        }

        if let Some(location) = self.city_from_google(lat, lng).await? {
            return Ok(Some(location));
        }
        self.city_from_nominatim(lat, lng).await
    }

    async fn city_from_google(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<Option<ResolvedLocation>, GeolocationError> {
        if self.google_api_key.is_empty() {
            return Ok(None);
        }

        let payload: GeocodeResponse = self
            .client
            .get(GOOGLE_GEOCODE_URL)
            .query(&[
                ("latlng", format!("{},{}", lat, lng)),
                ("key", self.google_api_key.clone()),
                ("language", "es".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(city_from_geocode(payload))
    }

    async fn city_from_nominatim(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<Option<ResolvedLocation>, GeolocationError> {
        let payload: NominatimResponse = self
            .client
            .get(NOMINATIM_REVERSE_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "jsonv2".to_string()),
                ("accept-language", "es".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(city_from_nominatim(payload))
    }
}

pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

pub fn normalize(city_name: &str, country_code: &str) -> ResolvedLocation {
    let city = match city_name.trim() {
        "" => DEFAULT_CITY,
        trimmed => trimmed,
    };
    let code: String = country_code.trim().to_uppercase().chars().take(2).collect();
    ResolvedLocation {
        city_name: city.to_string(),
        city_slug: slugify(city),
        country_code: if code.is_empty() {
            DEFAULT_COUNTRY.to_string()
        } else {
            code
        },
    }
}

fn city_from_geocode(payload: GeocodeResponse) -> Option<ResolvedLocation> {
    if payload.status != "OK" {
        return None;
    }

    payload.results.iter().find_map(|result| {
        let mut city = String::new();
        let mut country = DEFAULT_COUNTRY.to_string();
        for component in &result.address_components {
            let has = |kind: &str| component.types.iter().any(|t| t == kind);
            if has("locality") || has("administrative_area_level_2") {
                city = component.long_name.clone();
            }
            if has("country") {
                country = component.short_name.clone();
            }
        }
        (!city.trim().is_empty()).then(|| normalize(&city, &country))
    })
}

fn city_from_nominatim(payload: NominatimResponse) -> Option<ResolvedLocation> {
    let address = payload.address;
    let city = address
        .city
        .or(address.town)
        .or(address.municipality)
        .or(address.state_district)
        .filter(|city| !city.trim().is_empty())?;
    let country = address.country_code.unwrap_or_else(|| "co".to_string());
    Some(normalize(&city, &country))
}
