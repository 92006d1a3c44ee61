//! OpenAI-compatible chat-completions client
//!
//! Implements both model seams over `POST {base}/chat/completions`:
//! - `VisionModel`: one user message with a text part and a base64
//!   `data:` URI image part
//! - `TextModel`: system + user messages
//!
//! Transient failures (transport errors, 429, 5xx) are retried with
//! exponential backoff: 750 ms, ×1.75 per attempt, capped at 5 s.

use crate::types::{ImageSegment, ModelCallError, TextModel, VisionModel};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use terpscan_common::config::{get_user_agent, ModelSettings};
use terpscan_common::{Error, Result};
use tracing::{debug, warn};

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// First retry delay
const INITIAL_BACKOFF: Duration = Duration::from_millis(750);

/// Retry delay ceiling
const MAX_BACKOFF: Duration = Duration::from_millis(5000);

const BACKOFF_FACTOR: f64 = 1.75;

/// Output token ceiling; long menus produce long lists
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible endpoint
pub struct OpenAiCompatibleClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        max_attempts: u32,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(get_user_agent())
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_attempts: max_attempts.max(1),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Vision client from `[models]` settings
    pub fn vision(api_key: &str, settings: &ModelSettings) -> Result<Self> {
        Self::new(
            api_key,
            &settings.base_url,
            &settings.vision_model,
            settings.timeout_secs,
            settings.max_attempts,
        )
    }

    /// Text client from `[models]` settings
    pub fn text(api_key: &str, settings: &ModelSettings) -> Result<Self> {
        Self::new(
            api_key,
            &settings.base_url,
            &settings.text_model,
            settings.timeout_secs,
            settings.max_attempts,
        )
    }

    /// Override the first retry delay (tests use a few milliseconds)
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST the request, retrying transient failures
    async fn chat(&self, body: &Value) -> std::result::Result<String, ModelCallError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut delay = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.send_once(&url, body).await {
                Ok(content) => return Ok(content),
                Err(e) => e,
            };

            if !is_transient(&error) || attempt >= self.max_attempts {
                return Err(error);
            }

            warn!(
                model = %self.model,
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Model call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(BACKOFF_FACTOR).min(MAX_BACKOFF);
        }
    }

    async fn send_once(
        &self,
        url: &str,
        body: &Value,
    ) -> std::result::Result<String, ModelCallError> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelCallError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModelCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelCallError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ModelCallError::EmptyResponse);
        }

        debug!(model = %self.model, chars = content.len(), "Model response received");
        Ok(content)
    }
}

/// Worth another attempt: transport failure, rate limit, or server error
fn is_transient(error: &ModelCallError) -> bool {
    match error {
        ModelCallError::Network(_) => true,
        ModelCallError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        ModelCallError::EmptyResponse | ModelCallError::Malformed(_) => false,
    }
}

/// `data:{mime};base64,{payload}`
pub fn data_uri(segment: &ImageSegment) -> String {
    format!("data:{};base64,{}", segment.mime_type, STANDARD.encode(&segment.bytes))
}

#[async_trait]
impl VisionModel for OpenAiCompatibleClient {
    async fn describe_image(
        &self,
        segment: &ImageSegment,
        instruction: &str,
    ) -> std::result::Result<String, ModelCallError> {
        debug!(
            model = %self.model,
            offset_y = segment.offset_y,
            height = segment.height,
            bytes = segment.bytes.len(),
            "Vision request"
        );
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": data_uri(segment) } }
                ]
            }]
        });
        self.chat(&body).await
    }
}

#[async_trait]
impl TextModel for OpenAiCompatibleClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> std::result::Result<String, ModelCallError> {
        let body = json!({
            "model": self.model,
            "temperature": temperature,
            "max_tokens": MAX_TOKENS,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });
        self.chat(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_attempts: u32) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            "sk-test",
            format!("{}/v1", server.uri()),
            "gpt-4o",
            5,
            max_attempts,
        )
            .unwrap()
            .with_initial_backoff(Duration::from_millis(5))
    }

    fn completion(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    fn segment() -> ImageSegment {
        ImageSegment {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
            offset_y: 0,
            height: 10,
        }
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(data_uri(&segment()), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&ModelCallError::Network("reset".into())));
        assert!(is_transient(&ModelCallError::Status { status: 429, body: String::new() }));
        assert!(is_transient(&ModelCallError::Status { status: 503, body: String::new() }));
        assert!(!is_transient(&ModelCallError::Status { status: 401, body: String::new() }));
        assert!(!is_transient(&ModelCallError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_vision_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "temperature": 0.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("[]")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1);
        let answer = client.describe_image(&segment(), "List strains").await.unwrap();
        assert_eq!(answer, "[]");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "List strains");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_text_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("{\"myrcene\": 0.4}")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 1);
        let answer = client.complete("system", "user", 0.2).await.unwrap();
        assert_eq!(answer, "{\"myrcene\": 0.4}");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        assert_eq!(client.complete("s", "u", 0.0).await.unwrap(), "ok");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client.complete("s", "u", 0.0).await.unwrap_err();
        assert!(matches!(err, ModelCallError::Status { status: 502, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let err = client.complete("s", "u", 0.0).await.unwrap_err();
        assert_eq!(
            err,
            ModelCallError::Status {
                status: 401,
                body: "bad key".to_string()
            }
        );
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server, 1);
        assert_eq!(
            client.complete("s", "u", 0.0).await.unwrap_err(),
            ModelCallError::EmptyResponse
        );
    }
}
