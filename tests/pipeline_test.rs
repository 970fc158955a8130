use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use serde_json::{json, Value};

use descubreme_api::models::generation::{
    GenerateRequest, ItinerarySource, PlaceResult, UserPreferences,
};
use descubreme_api::services::openrouter_service::{ChatModel, Message, OpenRouterError, REPAIR_PROMPT};
use descubreme_api::services::places_service::{price_level_to_cop, PlaceSearch, PlacesError};
use descubreme_api::services::planner_service::{PlanGenerationError, PlanPipeline};

struct FakeModel {
    replies: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeModel {
    fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChatModel for FakeModel {
    async fn complete_json(&self, messages: &[Message]) -> Result<Value, OpenRouterError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OpenRouterError::Response("no scripted reply".to_string()))
    }
}

#[derive(Default)]
struct FakePlaces {
    results: HashMap<String, Vec<PlaceResult>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakePlaces {
    fn with(mut self, keyword: &str, ids: &[&str]) -> Self {
        self.results
            .insert(keyword.to_string(), ids.iter().map(|id| place(id)).collect());
        self
    }

    fn failing(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }
}

impl PlaceSearch for FakePlaces {
    async fn search_places(
        &self,
        query: &str,
        city: &str,
        limit: usize,
        _coordinates: Option<(f64, f64)>,
    ) -> Result<Vec<PlaceResult>, PlacesError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), city.to_string()));
        if self.failing.contains(query) {
            return Err(PlacesError::Status {
                status: "OVER_QUERY_LIMIT".to_string(),
                message: None,
            });
        }
        Ok(self
            .results
            .get(query)
            .map(|places| places.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

fn place(id: &str) -> PlaceResult {
    let price_level = if id.is_empty() { None } else { Some(1) };
    PlaceResult {
        name: format!("Lugar {}", id),
        place_id: id.to_string(),
        rating: Some(4.5),
        user_ratings_total: Some(320),
        price_level,
        estimated_cost_cop: price_level_to_cop(price_level),
        address: "Cra. 43A, Medellín".to_string(),
        photo_reference: None,
        photo_url: String::new(),
        maps_url: format!("https://www.google.com/maps/search/?api=1&query=google&query_place_id={}", id),
    }
}

fn parsed_reply() -> Value {
    json!({
        "city": "Medellín",
        "country": "CO",
        "budget_cop": 150000,
        "mood": "chill",
        "group": "amigos",
        "time_windows": [
            { "label": "Tarde", "start": "15:00", "end": "18:30", "place_types": ["café", "mirador"] },
            { "label": "Noche", "start": "19:00", "end": "23:30", "place_types": ["bar"] }
        ]
    })
}

fn request(prompt: &str) -> GenerateRequest {
    serde_json::from_value(json!({ "prompt": prompt, "city_name": "Medellín" })).unwrap()
}

fn places() -> FakePlaces {
    FakePlaces::default()
        .with("café", &["p1", "p2", "", "p9"])
        .with("mirador", &["p2", "p3"])
        .with("bar", &["p3", "p4"])
}

#[actix_rt::test]
async fn test_full_pipeline_with_model_itinerary() {
    let compose = json!({
        "title": "Café y bar en El Poblado",
        "city": "Medellín",
        "mood": "chill",
        "blocks": [
            { "label": "tarde", "steps": [
                { "place_id": "p1", "why": "Buen café", "estimated_time_minutes": 60 },
                { "place_id": "desconocido" }
            ] },
            { "label": "NOCHE", "steps": [
                { "place_id": "p4", "estimated_cost_cop": 70000 }
            ] }
        ],
        "total_estimated_cost_cop": 1
    });
    let pipeline = PlanPipeline::new(FakeModel::new(vec![parsed_reply(), compose]), places(), None);

    let generated = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await
        .unwrap();

    assert_eq!(generated.resolved_location.city_name, "Medellín");
    assert_eq!(generated.resolved_location.city_slug, "medellin");

    // p2 is found by both "café" and "mirador" and kept once; p3 moves to
    // the first window that found it; the id-less result is dropped.
    let tarde: Vec<&str> = generated.time_windows[0]
        .places
        .iter()
        .map(|p| p.place_id.as_str())
        .collect();
    let noche: Vec<&str> = generated.time_windows[1]
        .places
        .iter()
        .map(|p| p.place_id.as_str())
        .collect();
    assert_eq!(tarde, vec!["p1", "p2", "p3"]);
    assert_eq!(noche, vec!["p4"]);

    let itinerary = &generated.itinerary;
    assert_eq!(itinerary.source, ItinerarySource::Ai);
    assert_eq!(itinerary.title, "Café y bar en El Poblado");
    assert_eq!(itinerary.step_count(), 2);
    assert_eq!(itinerary.blocks[0].steps[0].order, 1);
    assert_eq!(itinerary.blocks[1].steps[0].order, 2);
    assert_eq!(itinerary.blocks[1].steps[0].name, "Lugar p4");
    assert_eq!(itinerary.total_estimated_cost_cop, Some(100_000));

    assert_eq!(generated.debug["queries"].as_array().unwrap().len(), 3);
    assert_eq!(generated.debug["itinerary_source"], "ai");

    let calls = pipeline.places().calls.lock().unwrap().clone();
    assert!(calls.iter().all(|(_, city)| city == "Medellín"));
}

#[actix_rt::test]
async fn test_composer_failure_falls_back() {
    let bad = json!({ "title": "sin bloques" });
    let model = FakeModel::new(vec![parsed_reply(), bad.clone(), bad]);
    let pipeline = PlanPipeline::new(model, places(), None);

    let generated = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await
        .unwrap();

    let itinerary = &generated.itinerary;
    assert_eq!(itinerary.source, ItinerarySource::Fallback);
    assert_eq!(itinerary.title, "Plan chill en Medellín");
    assert_eq!(itinerary.step_count(), 4);
    assert!(generated.debug["composer_error"].is_string());

    let calls = pipeline.model().calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].last(), Some(&Message::user(REPAIR_PROMPT)));
}

#[actix_rt::test]
async fn test_parse_is_repaired_once() {
    let model = FakeModel::new(vec![
        json!({ "city": "Medellín" }),
        parsed_reply(),
        json!({ "title": "t", "city": "c", "mood": "m", "blocks": [], "total_estimated_cost_cop": 0 }),
    ]);
    let pipeline = PlanPipeline::new(model, places(), None);

    let generated = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await
        .unwrap();
    assert_eq!(generated.parsed_request.time_windows.len(), 2);
    // No usable steps from the model.
    assert_eq!(generated.itinerary.source, ItinerarySource::Fallback);
}

#[actix_rt::test]
async fn test_parse_failure_is_reported() {
    let model = FakeModel::new(vec![json!({}), json!({ "time_windows": [] })]);
    let pipeline = PlanPipeline::new(model, places(), None);

    let result = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await;
    assert!(matches!(result, Err(PlanGenerationError::Parse(_))));
}

#[actix_rt::test]
async fn test_failed_query_aborts_with_trace() {
    let pipeline = PlanPipeline::new(
        FakeModel::new(vec![parsed_reply()]),
        places().failing("bar"),
        None,
    );

    let result = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await;
    match result {
        Err(PlanGenerationError::Places { debug, .. }) => {
            let queries = debug["queries"].as_array().unwrap();
            assert_eq!(queries.len(), 3);
            let failed = queries.iter().find(|q| q["keyword"] == "bar").unwrap();
            assert_eq!(failed["status"], "ERROR");
            assert_eq!(failed["window"], "Noche");
            assert!(failed["error"].as_str().unwrap().contains("OVER_QUERY_LIMIT"));
        }
        other => panic!("unexpected result: {:?}", other.map(|g| g.itinerary.title)),
    }
}

#[actix_rt::test]
async fn test_no_candidates() {
    let pipeline = PlanPipeline::new(
        FakeModel::new(vec![parsed_reply()]),
        FakePlaces::default(),
        None,
    );

    let result = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await;
    assert!(matches!(result, Err(PlanGenerationError::NoCandidates { .. })));
}

#[actix_rt::test]
async fn test_profile_preferences_shape_queries() {
    let preferences = UserPreferences {
        likes: vec!["arte".to_string()],
        avoid: vec!["mirador".to_string()],
        ..Default::default()
    };
    let pipeline = PlanPipeline::new(
        FakeModel::new(vec![parsed_reply()]),
        places().with("museo", &["m1"]),
        None,
    );

    let result = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &preferences)
        .await;
    // The composer reply is missing, so the fallback itinerary is used.
    let generated = result.unwrap();
    assert_eq!(generated.time_windows[0].queries, vec!["café", "museo", "galería"]);
    assert_eq!(generated.time_windows[1].queries, vec!["bar", "museo", "galería"]);

    let ids: Vec<&str> = generated.time_windows[0]
        .places
        .iter()
        .map(|p| p.place_id.as_str())
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "m1"]);
}

#[actix_rt::test]
async fn test_window_keeps_at_most_six_places() {
    let parsed = json!({
        "city": "Medellín",
        "mood": "chill",
        "time_windows": [
            { "label": "Tarde", "start": "15:00", "end": "18:30", "place_types": ["café", "mirador", "parque"] },
            { "label": "Noche", "start": "19:00", "end": "23:30", "place_types": ["bar"] }
        ]
    });
    let places = FakePlaces::default()
        .with("café", &["a1", "a2", "a3"])
        .with("mirador", &["a4", "a5", "a6"])
        .with("parque", &["a7", "a8", "a9"])
        .with("bar", &["a8", "b1"]);
    let pipeline = PlanPipeline::new(FakeModel::new(vec![parsed]), places, None);

    let generated = pipeline
        .generate(&request("Plan chill con amigos en Medellín"), &UserPreferences::default())
        .await
        .unwrap();

    let tarde: Vec<&str> = generated.time_windows[0]
        .places
        .iter()
        .map(|p| p.place_id.as_str())
        .collect();
    assert_eq!(tarde, vec!["a1", "a2", "a3", "a4", "a5", "a6"]);

    // a8 did not fit in the first window, so the next window that found it
    // may still use it.
    let noche: Vec<&str> = generated.time_windows[1]
        .places
        .iter()
        .map(|p| p.place_id.as_str())
        .collect();
    assert_eq!(noche, vec!["a8", "b1"]);
    assert_eq!(generated.itinerary.step_count(), 8);
}

#[actix_rt::test]
async fn test_short_prompt_never_reaches_model() {
    let pipeline = PlanPipeline::new(FakeModel::new(vec![]), places(), None);
    let result = pipeline
        .generate(&request("hola"), &UserPreferences::default())
        .await;
    assert!(matches!(result, Err(PlanGenerationError::InvalidPrompt(_))));
    assert!(pipeline.model().calls().is_empty());
}
