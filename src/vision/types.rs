use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// MIME type assumed when the upload's magic bytes are not recognised.
pub const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

/// Image ready to be embedded in a chat message as a data URL
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
}

impl ImagePayload {
    /// Sniff the MIME type and base64 encode the raw upload bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mime_type = infer::get(bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type())
            .unwrap_or(FALLBACK_IMAGE_MIME)
            .to_string();

        Self {
            mime_type,
            base64_data: general_purpose::STANDARD.encode(bytes),
        }
    }

    /// `data:<mime>;base64,<data>` form accepted by OpenAI-compatible APIs
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

/// Chat message role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// Message in a chat-completions request
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// Create a user message carrying an instruction and an image
    pub fn user_with_image(prompt: impl Into<String>, image: &ImagePayload) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![
                ContentPart::Text {
                    text: prompt.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Request body for `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Always false; the client reads a single JSON body
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    /// Create a non-streaming request for the given model
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable JSON object output mode
    pub fn with_json_output(mut self, json: bool) -> Self {
        self.response_format = json.then(|| ResponseFormat {
            format_type: "json_object".to_string(),
        });
        self
    }
}

/// Response from `POST /chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text of the first choice; empty when the model returned no content
    pub fn completion_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_deref().unwrap_or(""))
    }

    /// Why the first choice stopped, e.g. `stop` or `length`
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GIF_HEADER: &[u8] = b"GIF89a\x01\x00\x01\x00";

    #[test]
    fn test_image_payload_detects_gif() {
        let payload = ImagePayload::from_bytes(GIF_HEADER);
        assert_eq!(payload.mime_type, "image/gif");
        assert!(payload.data_url().starts_with("data:image/gif;base64,R0lGODlh"));
    }

    #[test]
    fn test_image_payload_falls_back_to_jpeg() {
        let payload = ImagePayload::from_bytes(b"not really an image");
        assert_eq!(payload.mime_type, FALLBACK_IMAGE_MIME);
        assert_eq!(payload.base64_data, "bm90IHJlYWxseSBhbiBpbWFnZQ==");
    }

    #[test]
    fn test_chat_request_serialization() {
        let image = ImagePayload {
            mime_type: "image/jpeg".to_string(),
            base64_data: "AAAA".to_string(),
        };
        let request = ChatRequest::new("vision-model", vec![ChatMessage::user_with_image("Look", &image)])
            .with_temperature(0.2)
            .with_max_tokens(256)
            .with_json_output(true);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "vision-model",
                "stream": false,
                "temperature": 0.2,
                "max_tokens": 256,
                "response_format": {"type": "json_object"},
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "Look"},
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_chat_request_omits_unset_options() {
        let request = ChatRequest::new("m", vec![]).with_json_output(false);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("temperature").is_none());
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_chat_response_completion_text() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "vision-model",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"a\": 1}"}, "finish_reason": "stop"}
            ]
        }))
        .unwrap();
        assert_eq!(response.completion_text(), Some("{\"a\": 1}"));
        assert_eq!(response.finish_reason(), Some("stop"));

        let empty: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert_eq!(empty.completion_text(), Some(""));
        assert_eq!(empty.finish_reason(), None);

        let none: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(none.completion_text(), None);
    }
}
