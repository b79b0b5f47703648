use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatMessage, ChatRequest, ChatResponse, ImagePayload};
use super::VisionModel;
use crate::config::{RequestConfig, VisionConfig};
use crate::error::{VisionError, VisionResult};

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    json_mode: bool,
    request_config: RequestConfig,
}

impl VisionClient {
    /// Create a new vision client
    pub fn new(config: &VisionConfig, request_config: RequestConfig) -> VisionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(VisionError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_mode: config.json_mode,
            request_config,
        })
    }

    /// Send one chat-completions request. Failures are not retried.
    pub async fn complete(&self, request: &ChatRequest) -> VisionResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let start = Instant::now();

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling vision model"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e));

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!(
                    model = %request.model,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Vision model call failed"
                );
                return Err(e);
            }
        };

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(
                model = %request.model,
                status = status.as_u16(),
                latency_ms = start.elapsed().as_millis(),
                "Vision model returned an error status"
            );
            return Err(VisionError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        // The client timeout also covers the body, so a slow body is a timeout
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let e = self.transport_error(e);
                error!(
                    model = %request.model,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Failed to read vision model response"
                );
                return Err(e);
            }
        };

        let chat_response: ChatResponse =
            serde_json::from_slice(&body).map_err(|e| VisionError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        info!(
            model = %request.model,
            response_id = chat_response.id.as_deref().unwrap_or(""),
            served_model = chat_response.model.as_deref().unwrap_or(""),
            finish_reason = chat_response.finish_reason().unwrap_or(""),
            latency_ms = start.elapsed().as_millis(),
            total_tokens = chat_response.usage.as_ref().and_then(|u| u.total_tokens),
            "Vision model call succeeded"
        );

        Ok(chat_response)
    }

    fn transport_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_timeout() {
            VisionError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            VisionError::Http(e)
        }
    }

    /// Build the diagnosis request for one image
    pub fn build_request(&self, image: &ImagePayload, prompt: &str) -> ChatRequest {
        ChatRequest::new(&self.model, vec![ChatMessage::user_with_image(prompt, image)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_json_output(self.json_mode)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured model id
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl VisionModel for VisionClient {
    async fn describe_image(&self, image: &ImagePayload, prompt: &str) -> VisionResult<String> {
        let request = self.build_request(image, prompt);
        let response = self.complete(&request).await?;

        if response.finish_reason() == Some("length") {
            warn!(
                max_tokens = self.max_tokens,
                "Vision model reply was cut off at the token limit"
            );
        }

        response
            .completion_text()
            .map(str::to_string)
            .ok_or_else(|| VisionError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })
    }
}
