//! Google Places text search.
//!
//! Results are mapped to [`PlaceResult`] with a COP cost estimate derived from
//! the place's price level, a Maps deep link and a photo URL.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::generation::PlaceResult;

const TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";
const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";
const REQUEST_TIMEOUT_SECS: u64 = 20;
const SEARCH_RADIUS_METERS: u32 = 6500;
const PHOTO_MAX_WIDTH: u32 = 1200;
const DEFAULT_PLACE_NAME: &str = "Lugar recomendado";

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("GOOGLE_PLACES_API_KEY no configurada.")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google Places respondió {status}.")]
    Status {
        status: String,
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<TextSearchResult>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResult {
    name: Option<String>,
    place_id: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    price_level: Option<u8>,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    photo_reference: Option<String>,
}

pub trait PlaceSearch {
    async fn search_places(
        &self,
        query: &str,
        city: &str,
        limit: usize,
        coordinates: Option<(f64, f64)>,
    ) -> Result<Vec<PlaceResult>, PlacesError>;
}

#[derive(Clone)]
pub struct GooglePlacesClient {
    client: Client,
    api_key: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: &str) -> Result<Self, PlacesError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl PlaceSearch for GooglePlacesClient {
    async fn search_places(
        &self,
        query: &str,
        city: &str,
        limit: usize,
        coordinates: Option<(f64, f64)>,
    ) -> Result<Vec<PlaceResult>, PlacesError> {
        if !self.is_configured() {
            return Err(PlacesError::MissingApiKey);
        }

        let mut params = vec![
            ("query", full_query(query, city)),
            ("language", "es".to_string()),
            ("region", "co".to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some((lat, lng)) = coordinates {
            params.push(("location", format!("{},{}", lat, lng)));
            params.push(("radius", SEARCH_RADIUS_METERS.to_string()));
        }

        log::debug!("Places text search: '{}'", params[0].1);
        let payload: TextSearchResponse = self
            .client
            .get(TEXT_SEARCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        map_response(payload, limit, &self.api_key)
    }
}

pub fn full_query(query: &str, city: &str) -> String {
    let city = city.trim();
    if city.is_empty() {
        query.trim().to_string()
    } else {
        format!("{} en {}", query.trim(), city)
    }
}

pub fn price_level_to_cop(price_level: Option<u8>) -> Option<i64> {
    match price_level? {
        0 => Some(15_000),
        1 => Some(30_000),
        2 => Some(60_000),
        3 => Some(110_000),
        4 => Some(180_000),
        _ => None,
    }
}

pub fn maps_url(place_id: &str) -> String {
    Url::parse_with_params(
        MAPS_SEARCH_URL,
        &[("api", "1"), ("query", "google"), ("query_place_id", place_id)],
    )
    .map(String::from)
    .unwrap_or_default()
}

pub fn photo_url(photo_reference: &str, api_key: &str) -> String {
    Url::parse_with_params(
        PHOTO_URL,
        &[
            ("maxwidth", PHOTO_MAX_WIDTH.to_string().as_str()),
            ("photo_reference", photo_reference),
            ("key", api_key),
        ],
    )
    .map(String::from)
    .unwrap_or_default()
}

fn map_response(
    payload: TextSearchResponse,
    limit: usize,
    api_key: &str,
) -> Result<Vec<PlaceResult>, PlacesError> {
    match payload.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(Vec::new()),
        _ => {
            return Err(PlacesError::Status {
                status: payload.status,
                message: payload.error_message,
            })
        }
    }

    Ok(payload
        .results
        .into_iter()
        .take(limit)
        .map(|place| {
            let place_id = place.place_id.unwrap_or_default();
            let photo_reference = place
                .photos
                .into_iter()
                .next()
                .and_then(|photo| photo.photo_reference)
                .filter(|reference| !reference.is_empty());

            PlaceResult {
                name: place
                    .name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PLACE_NAME.to_string()),
                maps_url: maps_url(&place_id),
                photo_url: photo_reference
                    .as_deref()
                    .map(|reference| photo_url(reference, api_key))
                    .unwrap_or_default(),
                place_id,
                rating: place.rating,
                user_ratings_total: place.user_ratings_total,
                estimated_cost_cop: price_level_to_cop(place.price_level),
                price_level: place.price_level,
                address: place
                    .formatted_address
                    .or(place.vicinity)
                    .unwrap_or_default(),
                photo_reference,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> TextSearchResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_price_levels_map_to_cop() {
        assert_eq!(price_level_to_cop(Some(0)), Some(15_000));
        assert_eq!(price_level_to_cop(Some(2)), Some(60_000));
        assert_eq!(price_level_to_cop(Some(4)), Some(180_000));
        assert_eq!(price_level_to_cop(Some(7)), None);
        assert_eq!(price_level_to_cop(None), None);
    }

    #[test]
    fn test_full_query_appends_city() {
        assert_eq!(full_query("bar", "Medellín"), "bar en Medellín");
        assert_eq!(full_query(" bar ", "  "), "bar");
    }

    #[test]
    fn test_urls_are_encoded() {
        assert_eq!(
            maps_url("ChIJ a&b"),
            "https://www.google.com/maps/search/?api=1&query=google&query_place_id=ChIJ+a%26b"
        );
        let url = photo_url("ref/1", "KEY");
        assert!(url.starts_with("https://maps.googleapis.com/maps/api/place/photo?maxwidth=1200"));
        assert!(url.contains("photo_reference=ref%2F1"));
        assert!(url.ends_with("key=KEY"));
    }

    #[test]
    fn test_maps_results_and_applies_limit() {
        let payload = parse(json!({
            "status": "OK",
            "results": [
                {
                    "name": "Café Velvet",
                    "place_id": "p1",
                    "rating": 4.6,
                    "user_ratings_total": 812,
                    "price_level": 2,
                    "formatted_address": "Cra. 37 #8A-46, Medellín",
                    "photos": [{ "photo_reference": "abc" }]
                },
                { "place_id": "p2", "vicinity": "El Poblado" },
                { "name": "Tercero", "place_id": "p3" }
            ]
        }));

        let places = map_response(payload, 2, "KEY").unwrap();
        assert_eq!(places.len(), 2);

        assert_eq!(places[0].name, "Café Velvet");
        assert_eq!(places[0].estimated_cost_cop, Some(60_000));
        assert_eq!(places[0].photo_reference.as_deref(), Some("abc"));
        assert!(places[0].photo_url.contains("photo_reference=abc"));
        assert!(places[0].maps_url.ends_with("query_place_id=p1"));

        assert_eq!(places[1].name, "Lugar recomendado");
        assert_eq!(places[1].address, "El Poblado");
        assert!(places[1].photo_url.is_empty());
        assert_eq!(places[1].estimated_cost_cop, None);
    }

    #[test]
    fn test_zero_results_is_empty() {
        let payload = parse(json!({ "status": "ZERO_RESULTS", "results": [] }));
        assert!(map_response(payload, 3, "KEY").unwrap().is_empty());
    }

    #[test]
    fn test_error_status_is_reported() {
        let payload = parse(json!({ "status": "REQUEST_DENIED", "error_message": "bad key" }));
        match map_response(payload, 3, "KEY") {
            Err(PlacesError::Status { status, message }) => {
                assert_eq!(status, "REQUEST_DENIED");
                assert_eq!(message.as_deref(), Some("bad key"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let client = GooglePlacesClient::new("").unwrap();
        let result = tokio_test::block_on(client.search_places("bar", "Cali", 3, None));
        assert!(matches!(result, Err(PlacesError::MissingApiKey)));
    }
}
