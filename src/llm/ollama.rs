use crate::domain::ports::ChatModel;
use crate::utils::error::{CategorizerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            seed: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    format: &'a str,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama `/api/chat` client with JSON mode and retry on 429 / 5xx.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    settings: OllamaSettings,
}

impl OllamaClient {
    pub fn new(settings: OllamaSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &OllamaSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// 確認伺服器可連線且模型已安裝
    pub async fn health_check(&self) -> Result<()> {
        let url = self.endpoint("/api/tags");
        tracing::debug!("Checking Ollama server at {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), body));
        }

        let tags: TagsResponse = response.json().await?;
        let wanted = &self.settings.model;
        let installed = tags
            .models
            .iter()
            .any(|m| m.name == *wanted || m.name == format!("{}:latest", wanted));

        if !installed {
            return Err(CategorizerError::ModelApiError {
                status: 404,
                message: format!(
                    "model '{}' is not installed (available: {})",
                    wanted,
                    tags.models
                        .iter()
                        .map(|m| m.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        tracing::info!("✓ Ollama model '{}' available at {}", wanted, self.settings.base_url);
        Ok(())
    }

    async fn chat_once(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            format: "json",
            stream: false,
            options: ChatOptions {
                temperature: self.settings.temperature,
                seed: self.settings.seed,
            },
        };

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), body));
        }

        let chat: ChatResponse = response.json().await?;
        tracing::debug!(
            "Ollama call succeeded: prompt_tokens={:?}, output_tokens={:?}",
            chat.prompt_eval_count,
            chat.eval_count
        );

        chat.message
            .map(|m| m.content)
            .ok_or_else(|| CategorizerError::ResponseValidationError {
                message: "Ollama response has no message".to_string(),
            })
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            match self.chat_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    // 指數退避：delay, 2*delay, 4*delay ...
                    let delay = Duration::from_millis(
                        self.settings
                            .retry_delay_ms
                            .saturating_mul(1u64 << (attempt - 1).min(16)),
                    );
                    tracing::warn!(
                        "⚠️ Model call failed ({}), retry {}/{} after {}ms",
                        e,
                        attempt,
                        self.settings.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

fn api_error(status: u16, body: String) -> CategorizerError {
    let message = serde_json::from_str::<OllamaError>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    CategorizerError::ModelApiError { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings_for(server: &MockServer) -> OllamaSettings {
        OllamaSettings {
            base_url: server.base_url(),
            retry_delay_ms: 1,
            ..OllamaSettings::default()
        }
    }

    #[tokio::test]
    async fn test_complete_sends_json_mode_request() {
        let server = MockServer::start();
        let chat_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .json_body_partial(r#"{"model": "llama3.2", "format": "json", "stream": false}"#);
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "model": "llama3.2",
                    "message": {"role": "assistant", "content": "{\"category\": \"Utilities\"}"},
                    "done": true,
                    "prompt_eval_count": 812,
                    "eval_count": 40
                }));
        });

        let client = OllamaClient::new(settings_for(&server)).unwrap();
        let content = client.complete("classify this").await.unwrap();

        chat_mock.assert();
        assert_eq!(content, "{\"category\": \"Utilities\"}");
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors_then_fails() {
        let server = MockServer::start();
        let chat_mock = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(503).body("overloaded");
        });

        let settings = OllamaSettings {
            max_retries: 2,
            ..settings_for(&server)
        };
        let client = OllamaClient::new(settings).unwrap();
        let err = client.complete("x").await.unwrap_err();

        chat_mock.assert_hits(3);
        assert!(matches!(err, CategorizerError::ModelApiError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_client_errors() {
        let server = MockServer::start();
        let chat_mock = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(404)
                .json_body(serde_json::json!({"error": "model 'llama3.2' not found"}));
        });

        let client = OllamaClient::new(settings_for(&server)).unwrap();
        let err = client.complete("x").await.unwrap_err();

        chat_mock.assert_hits(1);
        match err {
            CategorizerError::ModelApiError { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model 'llama3.2' not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_returned() {
        // 埠 1 無服務，連線會被拒絕
        let settings = OllamaSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            max_retries: 2,
            retry_delay_ms: 5,
            ..OllamaSettings::default()
        };
        let client = OllamaClient::new(settings).unwrap();

        let started = std::time::Instant::now();
        let err = client.complete("x").await.unwrap_err();

        assert!(matches!(err, CategorizerError::HttpError(_)), "{:?}", err);
        assert!(err.is_retryable());
        // 退避 5ms + 10ms
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_health_check_accepts_latest_tag() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).json_body(serde_json::json!({
                "models": [{"name": "qwen2.5:latest"}, {"name": "llama3.2:latest"}]
            }));
        });

        let client = OllamaClient::new(settings_for(&server)).unwrap();
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_reports_missing_model() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200)
                .json_body(serde_json::json!({"models": [{"name": "qwen2.5:latest"}]}));
        });

        let client = OllamaClient::new(settings_for(&server)).unwrap();
        let err = client.health_check().await.unwrap_err();
        assert!(matches!(err, CategorizerError::ModelApiError { status: 404, .. }));
    }
}
