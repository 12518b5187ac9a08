//! OpenAI-compatible completion gateway.
//!
//! Sends `POST {base_url}/chat/completions` with a bearer key read from the
//! configured environment variable. Works against any endpoint that speaks
//! the chat-completions wire format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use carcare_core::config::CompletionConfig;

use crate::context::ContextBlock;
use crate::gateway::{dialogue_actions, AssistantReply, CompletionGateway, GatewayError};

const PERSONA: &str = "You are a car maintenance and repair assistant. Your goal is to help \
users with their vehicle maintenance needs. Use the following context to provide accurate \
and helpful responses.";

const GUIDANCE: &str = "Please provide a helpful response focusing on car maintenance and \
repair. If the user's question is not related to car maintenance, politely redirect them to \
ask about car-related topics. Always be professional and informative.";

/// Gateway backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    api_key_env: String,
    api_key: Option<String>,
}

impl OpenAiGateway {
    pub fn new(config: &CompletionConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
            api_key: None,
        })
    }

    /// Use an explicit key instead of reading the environment.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Key is resolved per request so a rotated environment value is picked up.
    fn resolve_api_key(&self) -> Result<String, GatewayError> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(GatewayError::Unavailable(format!(
                "no API key in environment variable {}",
                self.api_key_env
            ))),
        }
    }

    fn build_body(&self, context: &ContextBlock, user_input: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system_prompt(context) },
                { "role": "user", "content": user_input },
            ],
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(
        &self,
        context: &ContextBlock,
        user_input: &str,
    ) -> Result<AssistantReply, GatewayError> {
        let api_key = self.resolve_api_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(url = %url, model = %self.model, "chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.build_body(context, user_input))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if let Some(err) = classify_status(status, &resp_text) {
            return Err(err);
        }

        let resp_json: Value = serde_json::from_str(&resp_text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let response = parse_completion(&resp_json)?;

        Ok(AssistantReply {
            response,
            actions: dialogue_actions(&context.vehicle),
            degraded: false,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// System message: persona, rendered context, answering guidance.
pub fn system_prompt(context: &ContextBlock) -> String {
    format!("{}\n\n{}\n{}", PERSONA, context.render(), GUIDANCE)
}

/// Map a non-success HTTP status onto a gateway error. `None` means success.
///
/// 429 is `RateLimited`; 400, 413 and 422 reject the payload we sent and are
/// `InvalidResponse`; every other status (auth, routing, 5xx) is `Unavailable`.
fn classify_status(status: StatusCode, body: &str) -> Option<GatewayError> {
    if status.is_success() {
        return None;
    }
    let detail = format!("HTTP {} - {}", status.as_u16(), truncate(body, 200));
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => GatewayError::InvalidResponse(detail),
        _ => GatewayError::Unavailable(detail),
    })
}

/// Extract the first choice's message content.
fn parse_completion(body: &Value) -> Result<String, GatewayError> {
    let content = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::InvalidResponse("no message content in response".into()))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(GatewayError::InvalidResponse("empty completion".into()));
    }
    Ok(content.to_string())
}

fn from_reqwest(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Unavailable(format!("request timed out: {}", e))
    } else if e.is_decode() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConversationSession;
    use carcare_core::types::VehicleInfo;

    fn config() -> CompletionConfig {
        CompletionConfig {
            api_key_env: "CARCARE_TEST_UNSET_API_KEY".to_string(),
            ..CompletionConfig::default()
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, "").is_none());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Some(GatewayError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            Some(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            Some(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "context_length_exceeded"),
            Some(GatewayError::InvalidResponse(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::PAYLOAD_TOO_LARGE, ""),
            Some(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_completion() {
        let body = json!({
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "  Rotate every 6,000 miles. " },
                "finish_reason": "stop"
            }]
        });
        assert_eq!(parse_completion(&body).unwrap(), "Rotate every 6,000 miles.");
    }

    #[test]
    fn test_parse_completion_invalid() {
        assert!(matches!(
            parse_completion(&json!({ "choices": [] })),
            Err(GatewayError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(&json!({ "choices": [{ "message": { "content": "   " } }] })),
            Err(GatewayError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(&json!({ "error": { "message": "oops" } })),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_system_prompt_embeds_context() {
        let info = VehicleInfo {
            make: Some("Subaru".to_string()),
            model: Some("Outback".to_string()),
            year: Some(2015),
            vin: None,
        };
        let ctx = crate::context::build_context(Some(&info), &ConversationSession::default());
        let prompt = system_prompt(&ctx);
        assert!(prompt.starts_with("You are a car maintenance and repair assistant."));
        assert!(prompt.contains("Make: Subaru"));
        assert!(prompt.contains("VIN: Unknown"));
        assert!(prompt.contains("Previous Conversation:"));
    }

    #[test]
    fn test_build_body() {
        let mut cfg = config();
        cfg.max_tokens = Some(256);
        let gateway = OpenAiGateway::new(&cfg).unwrap();
        let body = gateway.build_body(&ContextBlock::default(), "When do I change coolant?");

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "When do I change coolant?");
    }

    #[test]
    fn test_build_body_omits_unset_max_tokens() {
        let gateway = OpenAiGateway::new(&config()).unwrap();
        let body = gateway.build_body(&ContextBlock::default(), "hi");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let gateway = OpenAiGateway::new(&config()).unwrap();
        let result = gateway.complete(&ContextBlock::default(), "hello").await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        let cfg = CompletionConfig {
            base_url: "http://127.0.0.1:1/v1".to_string(),
            timeout_secs: 2,
            ..config()
        };
        let gateway = OpenAiGateway::new(&cfg).unwrap().with_api_key("sk-test");
        let result = gateway.complete(&ContextBlock::default(), "hello").await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
