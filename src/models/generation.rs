use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_COUNTRY: &str = "CO";
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 8.0;

/// Body of `POST /api/generate-plan`. Browsers send coordinates as strings
/// taken straight from form inputs, so numbers are accepted in either form.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub city_name: Option<String>,
}

/// Body of `POST /api/location/resolve`.
#[derive(Debug, Deserialize)]
pub struct Coordinates {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lng: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimeWindow {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub vibes: Vec<String>,
    #[serde(default)]
    pub place_types: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Constraints {
    #[serde(default = "default_max_distance", deserialize_with = "lenient_distance")]
    pub max_distance_km: f64,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub prioritize: Vec<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            avoid: Vec::new(),
            prioritize: Vec::new(),
        }
    }
}

/// Structured intent extracted from the user's free text.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ParsedRequest {
    #[serde(default)]
    pub city: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub budget_cop: Option<i64>,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub city_name: String,
    pub city_slug: String,
    pub country_code: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaceResult {
    pub name: String,
    pub place_id: String,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
    pub estimated_cost_cop: Option<i64>,
    pub address: String,
    pub photo_reference: Option<String>,
    pub photo_url: String,
    pub maps_url: String,
}

/// A time window together with the queries run for it and the places it kept
/// after deduplication.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WindowPlaces {
    pub label: String,
    pub start: String,
    pub end: String,
    pub queries: Vec<String>,
    pub places: Vec<PlaceResult>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItinerarySource {
    Ai,
    Fallback,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ItineraryStep {
    pub order: u32,
    pub place_id: String,
    pub name: String,
    pub title: String,
    pub why: String,
    pub description: String,
    pub address: String,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
    pub photo_reference: Option<String>,
    pub photo_url: String,
    pub maps_url: String,
    pub estimated_time_minutes: Option<u32>,
    pub estimated_cost_cop: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ItineraryBlock {
    pub label: String,
    pub start: String,
    pub end: String,
    pub steps: Vec<ItineraryStep>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Itinerary {
    pub title: String,
    pub city: String,
    pub mood: String,
    pub blocks: Vec<ItineraryBlock>,
    pub total_estimated_cost_cop: Option<i64>,
    pub source: ItinerarySource,
}

impl Itinerary {
    pub fn steps(&self) -> impl Iterator<Item = (&ItineraryBlock, &ItineraryStep)> {
        self.blocks
            .iter()
            .flat_map(|block| block.steps.iter().map(move |step| (block, step)))
    }

    pub fn step_count(&self) -> usize {
        self.blocks.iter().map(|block| block.steps.len()).sum()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratedPlan {
    pub parsed_request: ParsedRequest,
    pub resolved_location: ResolvedLocation,
    pub time_windows: Vec<WindowPlaces>,
    pub itinerary: Itinerary,
    pub debug: Value,
}

/// Profile-derived context fed into parsing and query planning.
#[derive(Debug, Clone, Default)]
pub struct UserPreferences {
    pub likes: Vec<String>,
    pub avoid: Vec<String>,
    pub preferred_vibes: Vec<String>,
    pub budget_min_cop: Option<i64>,
    pub budget_max_cop: Option<i64>,
    pub max_distance_km: Option<i64>,
    pub city: Option<String>,
}

impl UserPreferences {
    pub fn is_empty(&self) -> bool {
        self.likes.is_empty()
            && self.avoid.is_empty()
            && self.preferred_vibes.is_empty()
            && self.budget_min_cop.is_none()
            && self.budget_max_cop.is_none()
            && self.max_distance_km.is_none()
    }
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Upper bound for any amount or duration read from model output.
pub const MAX_LENIENT_AMOUNT: i64 = 1_000_000_000;

/// Reads a non-negative amount from a number, float or string such as
/// `"$ 120.000 COP"`. A `.` or `,` followed by exactly three digits groups
/// thousands; any other separator starts the fraction, which is dropped.
/// Negative and out-of-range values yield `None`.
pub fn lenient_amount(value: &Value) -> Option<i64> {
    let amount = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?.round();
                if !f.is_finite() || f < 0.0 || f > MAX_LENIENT_AMOUNT as f64 {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => amount_from_text(s)?,
        _ => return None,
    };
    (0..=MAX_LENIENT_AMOUNT).contains(&amount).then_some(amount)
}

fn amount_from_text(raw: &str) -> Option<i64> {
    let chars: Vec<char> = raw.trim().chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_digit() || *c == '-')?;
    if chars[start] == '-' {
        return None;
    }

    let mut digits = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == '.' || c == ',' {
            let group = chars[i + 1..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .count();
            if group != 3 {
                break;
            }
        } else {
            break;
        }
        if digits.len() > 12 {
            return None;
        }
        i += 1;
    }
    digits.parse().ok()
}

pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(lenient_amount))
}

fn lenient_distance<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?
        .filter(|km| km.is_finite() && *km > 0.0)
        .unwrap_or(DEFAULT_MAX_DISTANCE_KM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_request_accepts_string_coordinates() {
        let request: GenerateRequest = serde_json::from_value(json!({
            "prompt": "plan chill con amigos",
            "lat": "6.2442",
            "lng": null,
            "city_name": "Medellín"
        }))
        .unwrap();

        assert_eq!(request.lat, Some(6.2442));
        assert_eq!(request.lng, None);
        assert_eq!(request.city_name.as_deref(), Some("Medellín"));
    }

    #[test]
    fn test_parsed_request_defaults() {
        let parsed: ParsedRequest = serde_json::from_value(json!({
            "city": "Cali",
            "budget_cop": "120.000",
            "time_windows": [{ "label": "Noche", "start": "19:00", "end": "23:00" }],
            "constraints": { "max_distance_km": "no sé" }
        }))
        .unwrap();

        assert_eq!(parsed.country, "CO");
        assert_eq!(parsed.budget_cop, Some(120000));
        assert_eq!(parsed.constraints.max_distance_km, 8.0);
        assert!(parsed.time_windows[0].place_types.is_empty());
    }

    #[test]
    fn test_amount_text_formats() {
        assert_eq!(lenient_amount(&json!("120.000")), Some(120_000));
        assert_eq!(lenient_amount(&json!("$ 1,250,000 COP")), Some(1_250_000));
        assert_eq!(lenient_amount(&json!("45000.50")), Some(45_000));
        assert_eq!(lenient_amount(&json!("45.000,75")), Some(45_000));
        assert_eq!(lenient_amount(&json!("-5")), None);
        assert_eq!(lenient_amount(&json!("gratis")), None);
        assert_eq!(lenient_amount(&json!("99999999999999999999")), None);
    }

    #[test]
    fn test_amount_numbers_are_bounded() {
        assert_eq!(lenient_amount(&json!(30000)), Some(30_000));
        assert_eq!(lenient_amount(&json!(-1)), None);
        assert_eq!(lenient_amount(&json!(1e30)), None);
        assert_eq!(lenient_amount(&json!(MAX_LENIENT_AMOUNT + 1)), None);
    }

    #[test]
    fn test_float_budget_rounds() {
        let parsed: ParsedRequest =
            serde_json::from_value(json!({ "budget_cop": 99999.6 })).unwrap();
        assert_eq!(parsed.budget_cop, Some(100000));
    }
}
