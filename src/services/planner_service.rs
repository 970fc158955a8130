//! Plan generation pipeline.
//!
//! 1. The free-text prompt is parsed into a [`ParsedRequest`] by the chat model.
//! 2. Every time window expands into a handful of place queries; all queries run
//!    concurrently and the results are deduplicated by `place_id` across the
//!    whole plan.
//! 3. The chat model arranges the candidates into time-blocked steps, which are
//!    merged back with the place data. When the model cannot produce a usable
//!    itinerary a deterministic one is built from the candidates.

use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::errors::ApiError;
use crate::models::generation::{
    lenient_amount, GenerateRequest, GeneratedPlan, Itinerary, ItineraryBlock, ItinerarySource, ItineraryStep,
    ParsedRequest, PlaceResult, ResolvedLocation, TimeWindow, UserPreferences, WindowPlaces,
};
use crate::models::plan::MAX_TITLE_LEN;
use crate::services::geolocation_service::{normalize, GeolocationService};
use crate::services::intent_service::{parse_user_prompt, validate_prompt};
use crate::services::openrouter_service::{request_with_repair, ChatModel, Message, OpenRouterError};
use crate::services::places_service::{PlaceSearch, PlacesError};

pub const RESULTS_PER_QUERY: usize = 3;
pub const MAX_QUERIES_PER_WINDOW: usize = 4;
pub const MAX_PLACES_PER_WINDOW: usize = 6;

const REQUIRED_ITINERARY_KEYS: [&str; 5] = ["title", "city", "mood", "blocks", "total_estimated_cost_cop"];

#[derive(Debug, Error)]
pub enum PlanGenerationError {
    #[error("{0}")]
    InvalidPrompt(String),
    #[error("No pudimos interpretar tu solicitud: {0}")]
    Parse(#[source] OpenRouterError),
    #[error("Tuvimos un problema consultando Google Places: {source}")]
    Places {
        #[source]
        source: PlacesError,
        debug: Value,
    },
    #[error("No encontramos suficientes lugares para crear tu plan.")]
    NoCandidates { debug: Value },
}

impl From<PlanGenerationError> for ApiError {
    fn from(err: PlanGenerationError) -> Self {
        match err {
            PlanGenerationError::InvalidPrompt(message) => ApiError::BadRequest(message),
            PlanGenerationError::NoCandidates { ref debug } => ApiError::Upstream {
                message: err.to_string(),
                debug: Some(debug.clone()),
            },
            PlanGenerationError::Places { ref debug, .. } => ApiError::Upstream {
                message: err.to_string(),
                debug: Some(debug.clone()),
            },
            PlanGenerationError::Parse(_) => ApiError::Upstream {
                message: err.to_string(),
                debug: None,
            },
        }
    }
}

fn mood_queries(mood: &str) -> &'static [&'static str] {
    match normalize_term(mood).as_str() {
        "alegre" => &["discoteca", "rooftop", "bar", "parque de diversiones"],
        "chill" => &["café", "cervecería artesanal", "mirador", "parque"],
        "cine" => &["cine"],
        "comida" => &["restaurante", "hamburguesas", "helado artesanal"],
        _ => &[],
    }
}

fn interest_queries(interest: &str) -> Vec<String> {
    let known: &[&str] = match normalize_term(interest).as_str() {
        "comida" => &["restaurante", "hamburguesas", "helado artesanal"],
        "rumba" => &["discoteca", "rooftop", "bar"],
        "naturaleza" => &["mirador", "parque"],
        "cine" => &["cine"],
        "arte" => &["museo", "galería"],
        "café" | "cafe" => &["café", "coffee roaster"],
        "compras" => &["centro comercial", "mercado artesanal"],
        "deporte" => &["bowling", "cancha deportiva"],
        _ => return vec![interest.trim().to_string()],
    };
    known.iter().map(|q| q.to_string()).collect()
}

fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Search keywords for one window: its place types, then its vibes through the
/// mood table, the request mood when the window gave nothing, then profile
/// interests while there is room. Avoided terms are removed, duplicates are
/// collapsed, and the window label is the last resort.
pub fn window_queries(
    window: &TimeWindow,
    mood: &str,
    preferences: &UserPreferences,
    avoid: &[String],
) -> Vec<String> {
    let mut candidates: Vec<String> = window.place_types.clone();
    for vibe in &window.vibes {
        candidates.extend(mood_queries(vibe).iter().map(|q| q.to_string()));
    }
    if candidates.is_empty() {
        candidates.extend(mood_queries(mood).iter().map(|q| q.to_string()));
    }
    for interest in &preferences.likes {
        candidates.extend(interest_queries(interest));
    }

    let avoid: Vec<String> = avoid
        .iter()
        .map(|term| normalize_term(term))
        .filter(|term| !term.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut queries: Vec<String> = candidates
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .filter(|query| {
            let normalized = normalize_term(query);
            !avoid.iter().any(|term| normalized.contains(term.as_str()))
        })
        .filter(|query| seen.insert(normalize_term(query)))
        .take(MAX_QUERIES_PER_WINDOW)
        .collect();

    if queries.is_empty() {
        queries.push(window.label.clone());
    }
    queries
}

/// Picks the plan location: GPS, then the city the user typed, then the city
/// the model parsed, then the profile city.
pub fn choose_location(
    gps: Option<ResolvedLocation>,
    request_city: Option<&str>,
    parsed: &ParsedRequest,
    preferences: &UserPreferences,
) -> ResolvedLocation {
    if let Some(location) = gps {
        return location;
    }
    let country = if parsed.country.is_empty() { "CO" } else { parsed.country.as_str() };
    [
        request_city,
        Some(parsed.city.as_str()),
        preferences.city.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|city| !city.is_empty())
    .map(|city| normalize(city, country))
    .unwrap_or_else(|| normalize("", country))
}

pub struct PlanPipeline<M, P> {
    model: M,
    places: P,
    geolocation: Option<GeolocationService>,
}

impl<M: ChatModel, P: PlaceSearch> PlanPipeline<M, P> {
    pub fn new(model: M, places: P, geolocation: Option<GeolocationService>) -> Self {
        Self {
            model,
            places,
            geolocation,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn places(&self) -> &P {
        &self.places
    }

    pub async fn generate(
        &self,
        request: &GenerateRequest,
        preferences: &UserPreferences,
    ) -> Result<GeneratedPlan, PlanGenerationError> {
        let prompt = validate_prompt(&request.prompt).map_err(PlanGenerationError::InvalidPrompt)?;

        let (parsed, gps) = futures::join!(
            parse_user_prompt(&self.model, prompt, preferences),
            self.resolve_gps(request)
        );
        let parsed = parsed.map_err(PlanGenerationError::Parse)?;

        let location = choose_location(gps, request.city_name.as_deref(), &parsed, preferences);
        log::info!("Generating plan in {} ({})", location.city_name, location.country_code);

        let coordinates = request.lat.zip(request.lng);
        let (windows, trace) = self.collect_places(&parsed, &location, coordinates, preferences).await?;

        let (itinerary, composer_error) = self.compose(&parsed, &location, &windows).await;
        log::info!(
            "Itinerary ready: {} steps across {} blocks (source {:?})",
            itinerary.step_count(),
            itinerary.blocks.len(),
            itinerary.source
        );

        let mut debug = Map::new();
        debug.insert("queries".to_string(), trace);
        debug.insert("itinerary_source".to_string(), json!(itinerary.source));
        if let Some(error) = composer_error {
            debug.insert("composer_error".to_string(), json!(error));
        }

        Ok(GeneratedPlan {
            parsed_request: parsed,
            resolved_location: location,
            time_windows: windows,
            itinerary,
            debug: Value::Object(debug),
        })
    }

    async fn resolve_gps(&self, request: &GenerateRequest) -> Option<ResolvedLocation> {
        let geolocation = self.geolocation.as_ref()?;
        match geolocation
            .resolve_city_from_coordinates(request.lat, request.lng)
            .await
        {
            Ok(location) => location,
            Err(err) => {
                log::warn!("{}", err);
                None
            }
        }
    }

    /// Runs every window's queries concurrently and keeps each place in the
    /// first window (by window, query and result order) that found it.
    pub async fn collect_places(
        &self,
        parsed: &ParsedRequest,
        location: &ResolvedLocation,
        coordinates: Option<(f64, f64)>,
        preferences: &UserPreferences,
    ) -> Result<(Vec<WindowPlaces>, Value), PlanGenerationError> {
        let avoid: Vec<String> = preferences
            .avoid
            .iter()
            .chain(parsed.constraints.avoid.iter())
            .cloned()
            .collect();

        let plans: Vec<Vec<String>> = parsed
            .time_windows
            .iter()
            .map(|window| window_queries(window, &parsed.mood, preferences, &avoid))
            .collect();

        let jobs: Vec<(usize, &str)> = plans
            .iter()
            .enumerate()
            .flat_map(|(index, queries)| queries.iter().map(move |q| (index, q.as_str())))
            .collect();
        log::info!(
            "Running {} place queries for {} windows",
            jobs.len(),
            parsed.time_windows.len()
        );

        let results = join_all(jobs.iter().map(|(_, keyword)| {
            self.places
                .search_places(keyword, &location.city_name, RESULTS_PER_QUERY, coordinates)
        }))
        .await;

        let mut trace = Vec::with_capacity(jobs.len());
        let mut failure = None;
        let mut found: Vec<Vec<PlaceResult>> = vec![Vec::new(); plans.len()];
        for ((index, keyword), result) in jobs.iter().zip(results) {
            let label = &parsed.time_windows[*index].label;
            match result {
                Ok(places) => {
                    trace.push(json!({
                        "window": label,
                        "keyword": keyword,
                        "status": "OK",
                        "results": places
                            .iter()
                            .map(|p| json!({ "place_id": p.place_id, "name": p.name }))
                            .collect::<Vec<_>>(),
                    }));
                    found[*index].extend(places);
                }
                Err(err) => {
                    trace.push(json!({
                        "window": label,
                        "keyword": keyword,
                        "status": "ERROR",
                        "error": err.to_string(),
                    }));
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        let trace = json!(trace);

        if let Some(source) = failure {
            log::error!("Place search failed: {}", source);
            return Err(PlanGenerationError::Places {
                source,
                debug: json!({ "queries": trace }),
            });
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut windows = Vec::with_capacity(plans.len());
        let mut duplicates = 0usize;
        for ((window, queries), candidates) in parsed.time_windows.iter().zip(plans).zip(found) {
            let mut places = Vec::new();
            for place in candidates {
                if place.place_id.is_empty() {
                    continue;
                }
                if seen.contains(&place.place_id) {
                    duplicates += 1;
                    continue;
                }
                if places.len() >= MAX_PLACES_PER_WINDOW {
                    continue;
                }
                seen.insert(place.place_id.clone());
                places.push(place);
            }
            windows.push(WindowPlaces {
                label: window.label.clone(),
                start: window.start.clone(),
                end: window.end.clone(),
                queries,
                places,
            });
        }
        log::info!("Kept {} unique places, dropped {} duplicates", seen.len(), duplicates);

        if windows.iter().all(|window| window.places.is_empty()) {
            return Err(PlanGenerationError::NoCandidates {
                debug: json!({ "queries": trace }),
            });
        }

        Ok((windows, trace))
    }

    /// Asks the model for the itinerary. Returns the fallback itinerary plus the
    /// reason when the model output could not be used.
    async fn compose(
        &self,
        parsed: &ParsedRequest,
        location: &ResolvedLocation,
        windows: &[WindowPlaces],
    ) -> (Itinerary, Option<String>) {
        let messages = compose_messages(parsed, location, windows);
        match request_with_repair(&self.model, &messages, validate_ai_itinerary).await {
            Ok(raw) => {
                let itinerary = merge_itinerary(&raw, parsed, location, windows);
                if itinerary.step_count() > 0 {
                    (itinerary, None)
                } else {
                    log::warn!("Model itinerary referenced no known places; using fallback");
                    (
                        fallback_itinerary(parsed, location, windows),
                        Some("el itinerario no usó lugares conocidos".to_string()),
                    )
                }
            }
            Err(err) => {
                log::warn!("Itinerary composition failed ({}); using fallback", err);
                (fallback_itinerary(parsed, location, windows), Some(err.to_string()))
            }
        }
    }
}

fn compose_messages(
    parsed: &ParsedRequest,
    location: &ResolvedLocation,
    windows: &[WindowPlaces],
) -> Vec<Message> {
    let context = json!({
        "context": {
            "city": location.city_name,
            "country": location.country_code,
            "mood": parsed.mood,
            "group": parsed.group,
            "budget_cop": parsed.budget_cop,
            "max_distance_km": parsed.constraints.max_distance_km,
            "prioritize": parsed.constraints.prioritize,
        },
        "time_windows": windows
            .iter()
            .map(|window| json!({
                "label": window.label,
                "start": window.start,
                "end": window.end,
                "places": window.places.iter().map(|place| json!({
                    "place_id": place.place_id,
                    "name": place.name,
                    "address": place.address,
                    "rating": place.rating,
                    "price_level": place.price_level,
                    "estimated_cost_cop": place.estimated_cost_cop,
                })).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    });
    let shape = json!({
        "title": "Tarde chill y noche de rumba suave",
        "city": location.city_name,
        "mood": parsed.mood,
        "blocks": [{
            "label": "Tarde",
            "steps": [{
                "place_id": "<place_id de la lista>",
                "title": "Café de especialidad",
                "why": "Buen rating y ambiente tranquilo",
                "description": "Empieza con un café",
                "estimated_time_minutes": 60,
                "estimated_cost_cop": 30000
            }]
        }],
        "total_estimated_cost_cop": 90000
    });

    vec![
        Message::system(format!(
            "Eres un planificador de salidas. Arma un itinerario usando SOLO los lugares dados, \
             referenciados por place_id, respetando las franjas horarias y el presupuesto. \
             Devuelve SOLO JSON válido con esta estructura: {}",
            shape
        )),
        Message::user(context.to_string()),
    ]
}

/// Contract for the composer output: required keys present and `blocks` a list.
pub fn validate_ai_itinerary(value: Value) -> Result<Value, String> {
    let Some(object) = value.as_object() else {
        return Err("Respuesta AI inválida.".to_string());
    };
    for key in REQUIRED_ITINERARY_KEYS {
        if !object.contains_key(key) {
            return Err(format!("Falta campo obligatorio: {}", key));
        }
    }
    if !object["blocks"].is_array() {
        return Err("El campo blocks debe ser una lista.".to_string());
    }
    Ok(value)
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn integer(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(lenient_amount)
}

fn plan_title(raw: &str, parsed: &ParsedRequest, location: &ResolvedLocation) -> String {
    let title = raw.trim();
    if title.is_empty() {
        return fallback_title(parsed, location);
    }
    title.chars().take(MAX_TITLE_LEN).collect()
}

fn fallback_title(parsed: &ParsedRequest, location: &ResolvedLocation) -> String {
    let title = if parsed.mood.is_empty() {
        format!("Plan en {}", location.city_name)
    } else {
        format!("Plan {} en {}", parsed.mood, location.city_name)
    };
    title.chars().take(MAX_TITLE_LEN).collect()
}

fn step_from_place(place: &PlaceResult) -> ItineraryStep {
    ItineraryStep {
        order: 0,
        place_id: place.place_id.clone(),
        name: place.name.clone(),
        title: place.name.clone(),
        why: String::new(),
        description: String::new(),
        address: place.address.clone(),
        rating: place.rating,
        user_ratings_total: place.user_ratings_total,
        price_level: place.price_level,
        photo_reference: place.photo_reference.clone(),
        photo_url: place.photo_url.clone(),
        maps_url: place.maps_url.clone(),
        estimated_time_minutes: None,
        estimated_cost_cop: place.estimated_cost_cop,
    }
}

fn number_steps(blocks: &mut [ItineraryBlock]) {
    let mut order = 1;
    for step in blocks.iter_mut().flat_map(|block| block.steps.iter_mut()) {
        step.order = order;
        order += 1;
    }
}

fn total_cost(blocks: &[ItineraryBlock], model_total: Option<i64>) -> Option<i64> {
    let costs: Vec<i64> = blocks
        .iter()
        .flat_map(|block| block.steps.iter())
        .filter_map(|step| step.estimated_cost_cop)
        .collect();
    if costs.is_empty() {
        model_total
    } else {
        Some(costs.iter().fold(0i64, |acc, cost| acc.saturating_add(*cost)))
    }
}

/// Joins the model's blocks with the searched places. Steps naming a place
/// that was not searched, or one already used, are dropped.
pub fn merge_itinerary(
    raw: &Value,
    parsed: &ParsedRequest,
    location: &ResolvedLocation,
    windows: &[WindowPlaces],
) -> Itinerary {
    let candidates: HashMap<&str, &PlaceResult> = windows
        .iter()
        .flat_map(|window| window.places.iter())
        .map(|place| (place.place_id.as_str(), place))
        .collect();

    let ai_blocks: Vec<&Value> = raw
        .get("blocks")
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().collect())
        .unwrap_or_default();

    let mut used: HashSet<String> = HashSet::new();
    let mut blocks: Vec<ItineraryBlock> = windows
        .iter()
        .map(|window| {
            let label = normalize_term(&window.label);
            let steps = ai_blocks
                .iter()
                .filter(|block| normalize_term(&text(block, "label")) == label)
                .filter_map(|block| block.get("steps").and_then(Value::as_array))
                .flatten()
                .filter_map(|raw_step| {
                    let place_id = text(raw_step, "place_id");
                    let place = candidates.get(place_id.as_str())?;
                    if !used.insert(place_id) {
                        return None;
                    }
                    let mut step = step_from_place(place);
                    let title = text(raw_step, "title");
                    if !title.is_empty() {
                        step.title = title;
                    }
                    step.why = text(raw_step, "why");
                    step.description = text(raw_step, "description");
                    step.estimated_time_minutes = integer(raw_step, "estimated_time_minutes")
                        .and_then(|minutes| u32::try_from(minutes).ok());
                    if let Some(cost) = integer(raw_step, "estimated_cost_cop") {
                        step.estimated_cost_cop = Some(cost);
                    }
                    Some(step)
                })
                .collect();

            ItineraryBlock {
                label: window.label.clone(),
                start: window.start.clone(),
                end: window.end.clone(),
                steps,
            }
        })
        .collect();

    number_steps(&mut blocks);
    let total_estimated_cost_cop = total_cost(&blocks, integer(raw, "total_estimated_cost_cop"));
    let mood = if parsed.mood.is_empty() {
        text(raw, "mood")
    } else {
        parsed.mood.clone()
    };

    Itinerary {
        title: plan_title(&text(raw, "title"), parsed, location),
        city: location.city_name.clone(),
        mood,
        blocks,
        total_estimated_cost_cop,
        source: ItinerarySource::Ai,
    }
}

/// Deterministic itinerary: every window's places in search order.
pub fn fallback_itinerary(
    parsed: &ParsedRequest,
    location: &ResolvedLocation,
    windows: &[WindowPlaces],
) -> Itinerary {
    let mut blocks: Vec<ItineraryBlock> = windows
        .iter()
        .map(|window| ItineraryBlock {
            label: window.label.clone(),
            start: window.start.clone(),
            end: window.end.clone(),
            steps: window.places.iter().map(step_from_place).collect(),
        })
        .collect();
    number_steps(&mut blocks);

    Itinerary {
        title: fallback_title(parsed, location),
        city: location.city_name.clone(),
        mood: parsed.mood.clone(),
        total_estimated_cost_cop: total_cost(&blocks, None),
        blocks,
        source: ItinerarySource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::Constraints;

    fn window(label: &str, place_types: &[&str], vibes: &[&str]) -> TimeWindow {
        TimeWindow {
            label: label.to_string(),
            start: "15:00".to_string(),
            end: "18:00".to_string(),
            vibes: vibes.iter().map(|v| v.to_string()).collect(),
            place_types: place_types.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn parsed(mood: &str) -> ParsedRequest {
        ParsedRequest {
            city: "Medellín".to_string(),
            country: "CO".to_string(),
            budget_cop: Some(120_000),
            mood: mood.to_string(),
            group: "amigos".to_string(),
            time_windows: vec![window("Tarde", &["café"], &[])],
            constraints: Constraints::default(),
        }
    }

    fn place(id: &str, level: Option<u8>) -> PlaceResult {
        PlaceResult {
            name: format!("Lugar {}", id),
            place_id: id.to_string(),
            rating: Some(4.5),
            user_ratings_total: Some(100),
            price_level: level,
            estimated_cost_cop: crate::services::places_service::price_level_to_cop(level),
            address: "Calle 10".to_string(),
            photo_reference: None,
            photo_url: String::new(),
            maps_url: format!("https://maps/{}", id),
        }
    }

    fn windows() -> Vec<WindowPlaces> {
        vec![
            WindowPlaces {
                label: "Tarde".to_string(),
                start: "15:00".to_string(),
                end: "18:30".to_string(),
                queries: vec!["café".to_string()],
                places: vec![place("a", Some(1)), place("b", None)],
            },
            WindowPlaces {
                label: "Noche".to_string(),
                start: "19:00".to_string(),
                end: "23:30".to_string(),
                queries: vec!["bar".to_string()],
                places: vec![place("c", Some(2))],
            },
        ]
    }

    fn medellin() -> ResolvedLocation {
        normalize("Medellín", "CO")
    }

    #[test]
    fn test_queries_follow_place_types_then_vibes() {
        let w = window("Tarde", &["Café", "parque"], &["chill"]);
        let queries = window_queries(&w, "alegre", &UserPreferences::default(), &[]);
        // "café" from the chill vibe collapses with "Café".
        assert_eq!(queries, vec!["Café", "parque", "cervecería artesanal", "mirador"]);
    }

    #[test]
    fn test_queries_fall_back_to_mood_then_label() {
        let w = window("Noche", &[], &[]);
        let queries = window_queries(&w, "comida", &UserPreferences::default(), &[]);
        assert_eq!(queries, vec!["restaurante", "hamburguesas", "helado artesanal"]);

        let queries = window_queries(&w, "desconocido", &UserPreferences::default(), &[]);
        assert_eq!(queries, vec!["Noche"]);
    }

    #[test]
    fn test_queries_add_interests_and_drop_avoided_terms() {
        let w = window("Noche", &["bar", "discoteca"], &[]);
        let preferences = UserPreferences {
            likes: vec!["arte".to_string(), "karaoke".to_string()],
            ..Default::default()
        };
        let avoid = vec!["Discoteca".to_string()];
        let queries = window_queries(&w, "", &preferences, &avoid);
        assert_eq!(queries, vec!["bar", "museo", "galería", "karaoke"]);
    }

    #[test]
    fn test_location_precedence() {
        let preferences = UserPreferences {
            city: Some("Bogotá".to_string()),
            ..Default::default()
        };
        let gps = Some(normalize("Envigado", "CO"));
        assert_eq!(
            choose_location(gps, Some("Cali"), &parsed(""), &preferences).city_name,
            "Envigado"
        );
        assert_eq!(
            choose_location(None, Some("Cali"), &parsed(""), &preferences).city_name,
            "Cali"
        );
        assert_eq!(
            choose_location(None, Some("  "), &parsed(""), &preferences).city_name,
            "Medellín"
        );

        let mut no_city = parsed("");
        no_city.city.clear();
        assert_eq!(
            choose_location(None, None, &no_city, &preferences).city_name,
            "Bogotá"
        );
        assert_eq!(
            choose_location(None, None, &no_city, &UserPreferences::default()).city_name,
            "Colombia"
        );
    }

    #[test]
    fn test_validate_ai_itinerary_contract() {
        let valid = json!({
            "title": "t", "city": "c", "mood": "m", "blocks": [], "total_estimated_cost_cop": 0
        });
        assert!(validate_ai_itinerary(valid).is_ok());

        let missing = json!({ "title": "t", "city": "c", "mood": "m", "blocks": [] });
        assert_eq!(
            validate_ai_itinerary(missing).unwrap_err(),
            "Falta campo obligatorio: total_estimated_cost_cop"
        );

        let not_list = json!({
            "title": "t", "city": "c", "mood": "m", "blocks": {}, "total_estimated_cost_cop": 0
        });
        assert!(validate_ai_itinerary(not_list).is_err());
        assert!(validate_ai_itinerary(json!("texto")).is_err());
    }

    #[test]
    fn test_merge_keeps_known_places_once_and_numbers_steps() {
        let raw = json!({
            "title": "Tarde de café",
            "city": "Medellín",
            "mood": "chill",
            "blocks": [
                { "label": "noche", "steps": [
                    { "place_id": "c", "title": "Bar", "estimated_cost_cop": "45.000", "estimated_time_minutes": 90 }
                ] },
                { "label": "Tarde", "steps": [
                    { "place_id": "b", "why": "tranquilo" },
                    { "place_id": "inventado" },
                    { "place_id": "b" },
                    { "place_id": "a", "estimated_time_minutes": 45 }
                ] },
                { "label": "Madrugada", "steps": [{ "place_id": "a" }] }
            ],
            "total_estimated_cost_cop": 999
        });

        let itinerary = merge_itinerary(&raw, &parsed("chill"), &medellin(), &windows());
        assert_eq!(itinerary.source, ItinerarySource::Ai);
        assert_eq!(itinerary.title, "Tarde de café");
        assert_eq!(itinerary.blocks.len(), 2);

        let tarde = &itinerary.blocks[0];
        assert_eq!(tarde.label, "Tarde");
        let ids: Vec<&str> = tarde.steps.iter().map(|s| s.place_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(tarde.steps[0].order, 1);
        assert_eq!(tarde.steps[0].title, "Lugar b");
        assert_eq!(tarde.steps[0].why, "tranquilo");
        assert_eq!(tarde.steps[1].estimated_cost_cop, Some(30_000));

        let noche = &itinerary.blocks[1];
        assert_eq!(noche.steps[0].order, 3);
        assert_eq!(noche.steps[0].estimated_cost_cop, Some(45_000));
        assert_eq!(noche.steps[0].estimated_time_minutes, Some(90));

        // Step costs win over the model's total.
        assert_eq!(itinerary.total_estimated_cost_cop, Some(75_000));
    }

    #[test]
    fn test_merge_uses_model_total_without_step_costs() {
        let mut w = windows();
        w[0].places = vec![place("b", None)];
        w[1].places.clear();
        let raw = json!({
            "title": "",
            "city": "x",
            "mood": "x",
            "blocks": [{ "label": "Tarde", "steps": [{ "place_id": "b" }] }],
            "total_estimated_cost_cop": 50000
        });

        let itinerary = merge_itinerary(&raw, &parsed(""), &medellin(), &w);
        assert_eq!(itinerary.total_estimated_cost_cop, Some(50_000));
        assert_eq!(itinerary.title, "Plan en Medellín");
        assert_eq!(itinerary.mood, "x");
    }

    #[test]
    fn test_oversized_step_costs_use_place_estimate() {
        let raw = json!({
            "title": "Caro",
            "city": "Medellín",
            "mood": "chill",
            "blocks": [
                { "label": "Tarde", "steps": [{ "place_id": "a", "estimated_cost_cop": 1e30 }] },
                { "label": "Noche", "steps": [{ "place_id": "c", "estimated_cost_cop": "-5" }] }
            ],
            "total_estimated_cost_cop": 1e30
        });

        let itinerary = merge_itinerary(&raw, &parsed("chill"), &medellin(), &windows());
        assert_eq!(itinerary.blocks[0].steps[0].estimated_cost_cop, Some(30_000));
        assert_eq!(itinerary.blocks[1].steps[0].estimated_cost_cop, Some(60_000));
        assert_eq!(itinerary.total_estimated_cost_cop, Some(90_000));
    }

    #[test]
    fn test_total_cost_saturates() {
        let mut itinerary = fallback_itinerary(&parsed("chill"), &medellin(), &windows());
        for block in itinerary.blocks.iter_mut() {
            for step in block.steps.iter_mut() {
                step.estimated_cost_cop = Some(i64::MAX);
            }
        }
        assert_eq!(total_cost(&itinerary.blocks, None), Some(i64::MAX));
    }

    #[test]
    fn test_fallback_uses_search_order() {
        let itinerary = fallback_itinerary(&parsed("chill"), &medellin(), &windows());
        assert_eq!(itinerary.source, ItinerarySource::Fallback);
        assert_eq!(itinerary.title, "Plan chill en Medellín");
        let orders: Vec<(u32, &str)> = itinerary
            .steps()
            .map(|(_, step)| (step.order, step.place_id.as_str()))
            .collect();
        assert_eq!(orders, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(itinerary.total_estimated_cost_cop, Some(90_000));
    }

    #[test]
    fn test_generation_errors_map_to_http() {
        let err: ApiError = PlanGenerationError::InvalidPrompt("corto".to_string()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = PlanGenerationError::NoCandidates { debug: json!({ "queries": [] }) }.into();
        match err {
            ApiError::Upstream { debug, .. } => assert_eq!(debug, Some(json!({ "queries": [] }))),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
