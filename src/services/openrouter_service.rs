use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::OpenRouterConfig;

const REQUEST_TIMEOUT_SECS: u64 = 35;
const TEMPERATURE: f64 = 0.2;
pub const REPAIR_PROMPT: &str = "Devuelve SOLO JSON válido. Sin comentarios, sin texto adicional.";

#[derive(Debug, Error)]
pub enum OpenRouterError {
    #[error("OPENROUTER_API_KEY no configurada.")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Response error: {0}")]
    Response(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat model that answers with a single JSON object.
pub trait ChatModel {
    async fn complete_json(&self, messages: &[Message]) -> Result<Value, OpenRouterError>;
}

#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, OpenRouterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "response_format": { "type": "json_object" },
        })
    }
}

impl ChatModel for OpenRouterClient {
    async fn complete_json(&self, messages: &[Message]) -> Result<Value, OpenRouterError> {
        if !self.is_configured() {
            return Err(OpenRouterError::MissingApiKey);
        }

        let mut request = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(messages));
        if !self.config.site_url.is_empty() {
            request = request.header("HTTP-Referer", &self.config.site_url);
        }
        if !self.config.app_name.is_empty() {
            request = request.header("X-Title", &self.config.app_name);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OpenRouterError::Response(format!(
                "Chat completion failed with status {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await?;
        extract_json(&body)
    }
}

/// Parses the JSON object held in `choices[0].message.content`.
pub fn extract_json(response: &Value) -> Result<Value, OpenRouterError> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| OpenRouterError::InvalidResponse("missing message content".to_string()))?;

    serde_json::from_str(strip_code_fence(content))
        .map_err(|e| OpenRouterError::InvalidResponse(format!("content is not JSON: {}", e)))
}

/// Models sometimes wrap JSON in a markdown fence despite being told not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Runs a JSON completion and validates it. Any failure other than a missing
/// key is retried exactly once with an extra "only JSON" instruction.
pub async fn request_with_repair<M, T, F>(
    model: &M,
    messages: &[Message],
    validate: F,
) -> Result<T, OpenRouterError>
where
    M: ChatModel,
    F: Fn(Value) -> Result<T, String>,
{
    let first = match attempt(model, messages, &validate).await {
        Ok(value) => return Ok(value),
        Err(OpenRouterError::MissingApiKey) => return Err(OpenRouterError::MissingApiKey),
        Err(err) => err,
    };
    log::warn!("Model output rejected ({}); retrying once with repair prompt", first);

    let mut retry_messages = messages.to_vec();
    retry_messages.push(Message::user(REPAIR_PROMPT));

    attempt(model, &retry_messages, &validate)
        .await
        .map_err(|err| match err {
            OpenRouterError::MissingApiKey => OpenRouterError::MissingApiKey,
            other => OpenRouterError::InvalidResponse(format!(
                "No fue posible obtener JSON válido desde OpenRouter: {}",
                other
            )),
        })
}

async fn attempt<M, T, F>(model: &M, messages: &[Message], validate: &F) -> Result<T, OpenRouterError>
where
    M: ChatModel,
    F: Fn(Value) -> Result<T, String>,
{
    let value = model.complete_json(messages).await?;
    validate(value).map_err(OpenRouterError::InvalidResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Value, OpenRouterError>>>,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<Value, OpenRouterError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<Message>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ChatModel for ScriptedModel {
        async fn complete_json(&self, messages: &[Message]) -> Result<Value, OpenRouterError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OpenRouterError::Response("no more replies".to_string())))
        }
    }

    fn needs_title(value: Value) -> Result<String, String> {
        value["title"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "Falta campo obligatorio: title".to_string())
    }

    #[test]
    fn test_extract_json_reads_first_choice() {
        let response = json!({
            "choices": [{ "message": { "content": "{\"city\": \"Cali\"}" } }]
        });
        assert_eq!(extract_json(&response).unwrap(), json!({ "city": "Cali" }));
    }

    #[test]
    fn test_extract_json_strips_markdown_fence() {
        let response = json!({
            "choices": [{ "message": { "content": "```json\n{\"ok\": true}\n```" } }]
        });
        assert_eq!(extract_json(&response).unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_extract_json_rejects_missing_content_and_prose() {
        assert!(matches!(
            extract_json(&json!({ "choices": [] })),
            Err(OpenRouterError::InvalidResponse(_))
        ));
        let prose = json!({ "choices": [{ "message": { "content": "Claro, aquí tienes tu plan" } }] });
        assert!(matches!(
            extract_json(&prose),
            Err(OpenRouterError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_first_valid_answer_is_used_without_retry() {
        let model = ScriptedModel::new(vec![Ok(json!({ "title": "Plan" }))]);
        let messages = vec![Message::system("s"), Message::user("u")];

        let title = tokio_test::block_on(request_with_repair(&model, &messages, needs_title)).unwrap();
        assert_eq!(title, "Plan");
        assert_eq!(model.calls().len(), 1);
    }

    #[test]
    fn test_invalid_answer_is_repaired_once() {
        let model = ScriptedModel::new(vec![
            Ok(json!({ "nope": 1 })),
            Ok(json!({ "title": "Segundo intento" })),
        ]);
        let messages = vec![Message::system("s"), Message::user("u")];

        let title = tokio_test::block_on(request_with_repair(&model, &messages, needs_title)).unwrap();
        assert_eq!(title, "Segundo intento");

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 3);
        assert_eq!(calls[1][2], Message::user(REPAIR_PROMPT));
    }

    #[test]
    fn test_second_failure_is_reported() {
        let model = ScriptedModel::new(vec![
            Err(OpenRouterError::InvalidResponse("not json".to_string())),
            Err(OpenRouterError::Response("status 500".to_string())),
            Ok(json!({ "title": "never reached" })),
        ]);
        let messages = vec![Message::user("u")];

        let result = tokio_test::block_on(request_with_repair(&model, &messages, needs_title));
        assert!(matches!(result, Err(OpenRouterError::InvalidResponse(_))));
        assert_eq!(model.calls().len(), 2);
    }

    #[test]
    fn test_missing_key_is_not_retried() {
        let model = ScriptedModel::new(vec![Err(OpenRouterError::MissingApiKey)]);
        let result = tokio_test::block_on(request_with_repair(&model, &[Message::user("u")], needs_title));
        assert!(matches!(result, Err(OpenRouterError::MissingApiKey)));
        assert_eq!(model.calls().len(), 1);
    }

    #[test]
    fn test_unconfigured_client_fails_fast() {
        let client = OpenRouterClient::new(OpenRouterConfig::default()).unwrap();
        assert!(!client.is_configured());
        let result = tokio_test::block_on(client.complete_json(&[Message::user("hola")]));
        assert!(matches!(result, Err(OpenRouterError::MissingApiKey)));
    }

    #[test]
    fn test_request_body_forces_json_mode() {
        let client = OpenRouterClient::new(OpenRouterConfig::default()).unwrap();
        let body = client.request_body(&[Message::user("hola")]);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["model"], "google/gemma-2-9b-it:free");
    }
}
