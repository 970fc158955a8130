use chrono::NaiveTime;
use serde_json::{json, Value};

use crate::models::generation::{ParsedRequest, TimeWindow, UserPreferences, DEFAULT_COUNTRY};
use crate::services::openrouter_service::{request_with_repair, ChatModel, Message, OpenRouterError};

pub const MIN_PROMPT_CHARS: usize = 8;
pub const MAX_PROMPT_CHARS: usize = 1000;

fn schema_hint() -> Value {
    json!({
        "city": "Medellín",
        "country": "CO",
        "budget_cop": 120000,
        "mood": "alegre",
        "group": "amigos",
        "time_windows": [
            { "label": "Tarde", "start": "15:00", "end": "18:30", "vibes": ["chill"], "place_types": ["cafe", "ice_cream", "park"] },
            { "label": "Noche", "start": "19:00", "end": "23:30", "vibes": ["rumba suave"], "place_types": ["bar", "brewery", "live music"] }
        ],
        "constraints": { "max_distance_km": 8, "avoid": ["muy caro"], "prioritize": ["rating>=4.4", "popular"] }
    })
}

fn system_prompt() -> String {
    format!(
        "Eres un parser experto para una app de planes. Devuelve SOLO JSON válido y estricto, sin markdown ni texto extra. \
         Si faltan datos, infiérelos de forma razonable para Colombia. Estructura exacta esperada: {}",
        schema_hint()
    )
}

/// Checks prompt length and returns it trimmed.
pub fn validate_prompt(prompt: &str) -> Result<&str, String> {
    let trimmed = prompt.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_PROMPT_CHARS {
        return Err(format!(
            "Describe tu plan con al menos {} caracteres.",
            MIN_PROMPT_CHARS
        ));
    }
    if chars > MAX_PROMPT_CHARS {
        return Err(format!(
            "La descripción no puede superar {} caracteres.",
            MAX_PROMPT_CHARS
        ));
    }
    Ok(trimmed)
}

fn user_message(prompt: &str, preferences: &UserPreferences) -> String {
    if preferences.is_empty() {
        return prompt.to_string();
    }

    let mut context = Vec::new();
    if !preferences.likes.is_empty() {
        context.push(format!("le gusta: {}", preferences.likes.join(", ")));
    }
    if !preferences.preferred_vibes.is_empty() {
        context.push(format!("vibes preferidas: {}", preferences.preferred_vibes.join(", ")));
    }
    if !preferences.avoid.is_empty() {
        context.push(format!("evitar: {}", preferences.avoid.join(", ")));
    }
    match (preferences.budget_min_cop, preferences.budget_max_cop) {
        (Some(min), Some(max)) => context.push(format!("presupuesto entre {} y {} COP", min, max)),
        (None, Some(max)) => context.push(format!("presupuesto máximo {} COP", max)),
        (Some(min), None) => context.push(format!("presupuesto mínimo {} COP", min)),
        (None, None) => {}
    }
    if let Some(km) = preferences.max_distance_km {
        context.push(format!("distancia máxima {} km", km));
    }

    format!("{}\n\nPreferencias del usuario: {}.", prompt, context.join("; "))
}

pub async fn parse_user_prompt<M: ChatModel>(
    model: &M,
    prompt: &str,
    preferences: &UserPreferences,
) -> Result<ParsedRequest, OpenRouterError> {
    let messages = vec![
        Message::system(system_prompt()),
        Message::user(user_message(prompt, preferences)),
    ];

    let parsed = request_with_repair(model, &messages, validate_parsed_request).await?;
    log::info!(
        "Parsed prompt: city='{}' mood='{}' windows={}",
        parsed.city,
        parsed.mood,
        parsed.time_windows.len()
    );
    Ok(parsed)
}

/// Enforces the parser contract on raw model output and normalises it.
pub fn validate_parsed_request(value: Value) -> Result<ParsedRequest, String> {
    if !value.is_object() {
        return Err("La respuesta debe ser un objeto JSON.".to_string());
    }
    match value.get("time_windows") {
        Some(Value::Array(windows)) if !windows.is_empty() => {}
        Some(Value::Array(_)) => return Err("time_windows no puede estar vacío.".to_string()),
        _ => return Err("Falta campo obligatorio: time_windows".to_string()),
    }

    let mut parsed: ParsedRequest =
        serde_json::from_value(value).map_err(|e| format!("Estructura inválida: {}", e))?;

    parsed.city = parsed.city.trim().to_string();
    parsed.mood = parsed.mood.trim().to_lowercase();
    parsed.group = parsed.group.trim().to_string();
    parsed.country = normalize_country(&parsed.country);
    parsed.budget_cop = parsed.budget_cop.filter(|budget| *budget > 0);

    for (index, window) in parsed.time_windows.iter_mut().enumerate() {
        normalize_window(window).map_err(|e| format!("time_windows[{}]: {}", index, e))?;
    }

    Ok(parsed)
}

fn normalize_country(raw: &str) -> String {
    let code: String = raw.trim().chars().take(2).collect::<String>().to_uppercase();
    if code.chars().count() == 2 {
        code
    } else {
        DEFAULT_COUNTRY.to_string()
    }
}

fn normalize_window(window: &mut TimeWindow) -> Result<(), String> {
    window.label = window.label.trim().to_string();
    if window.label.is_empty() {
        return Err("label vacío".to_string());
    }

    let start = parse_clock(&window.start).ok_or_else(|| format!("start inválido '{}'", window.start))?;
    let end = parse_clock(&window.end).ok_or_else(|| format!("end inválido '{}'", window.end))?;
    // end < start means the window runs past midnight.
    if start == end {
        return Err("start y end no pueden ser iguales".to_string());
    }
    window.start = start.format("%H:%M").to_string();
    window.end = end.format("%H:%M").to_string();

    window.vibes = clean_terms(&window.vibes);
    window.place_types = clean_terms(&window.place_types);
    Ok(())
}

pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn clean_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}
