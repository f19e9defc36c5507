//! Minimal client for OpenAI-compatible chat completion endpoints.

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use autopress_shared::{AutopressError, LlmConfig, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion client shared by the LLM-backed research and writing
/// collaborators.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Build a client from an `llm:` config block. Fails if no API key is set.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            AutopressError::config("llm.api_key is required for an LLM-backed provider")
        })?;
        let http = autopress_sources::build_client()?;
        Ok(Self::new(http, &config.endpoint, api_key, &config.model))
    }

    pub fn new(http: Client, endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| AutopressError::config(format!("invalid API key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send a system + user prompt and return the first choice's text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
        };

        debug!(model = %self.model, prompt_len = user.len(), "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AutopressError::Generation(format!(
                "chat completion failed ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AutopressError::parse(format!("invalid chat completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AutopressError::Generation("empty chat completion".into()))
    }
}

/// Strip a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(Client::new(), &server.uri(), "sk-test", "test-model")
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hello there" } }]
            })))
            .mount(&server)
            .await;

        let text = client(&server).complete("system", "hi").await.unwrap();
        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn http_error_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AutopressError::Generation(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        assert!(client(&server).complete("s", "u").await.is_err());
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let err = LlmClient::from_config(&LlmConfig::default()).unwrap_err();
        assert!(matches!(err, AutopressError::Config { .. }));
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }
}
