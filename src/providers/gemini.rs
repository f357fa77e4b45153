//! Gemini (Google) study notes provider.

use crate::error::{parse_retry_after, sanitize_error_message, NotesError, Result};
use crate::model::{ContentPart, ModelReply, NotesModel, NotesRequest};
use crate::upload::EncodedPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Environment variable the CLI reads the API key from.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Builder for GeminiProvider.
#[derive(Debug, Clone)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl Default for GeminiProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Required.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model identifier (e.g. `gemini-2.0-flash`).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the provider. Fails if no API key was given.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NotesError::Config(format!("{API_KEY_ENV} not set")))?;

        if self.model.trim().is_empty() {
            return Err(NotesError::Config("model identifier is empty".into()));
        }

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            base_url: self.base_url,
        })
    }
}

/// Gemini study notes provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn generate_impl(&self, request: &NotesRequest) -> Result<ModelReply> {
        let start = Instant::now();

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GeminiRequest::from_notes_request(request)?;

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(transport_error)?;
        let reply = gemini_response.into_reply(&self.model)?;

        tracing::debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            chars = reply.text.chars().count(),
            truncated = reply.truncated,
            "Gemini notes generation complete"
        );
        if reply.truncated {
            tracing::warn!(model = %self.model, "Gemini stopped at the output token limit");
        }

        Ok(reply)
    }
}

/// Connect failures and timeouts mean the service was never reached.
fn transport_error(e: reqwest::Error) -> NotesError {
    if e.is_connect() || e.is_timeout() {
        NotesError::Unavailable(e.to_string())
    } else if e.is_decode() {
        NotesError::UnexpectedResponse(e.to_string())
    } else {
        NotesError::Network(e)
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> NotesError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return NotesError::InvalidRequest(
            "Model not found. Verify the model name is correct.".into(),
        );
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return NotesError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return NotesError::Auth(text);
    }
    if status == 400 && text.to_lowercase().contains("api key") {
        return NotesError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return NotesError::ContentBlocked(text);
    }
    NotesError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl NotesModel for GeminiProvider {
    async fn generate(&self, request: &NotesRequest) -> Result<ModelReply> {
        self.generate_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status().as_u16() {
            401 | 403 => Err(NotesError::Auth("Invalid API key".into())),
            404 => Err(NotesError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(NotesError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiRequestPart {
    fn from_part(part: &ContentPart) -> Result<Self> {
        match part {
            ContentPart::Text { text } => Ok(Self::Text { text: text.clone() }),
            ContentPart::ImageUrl { url } => {
                // Gemini takes images inline, not as URLs.
                let payload = EncodedPayload::from_data_uri(url)?;
                Ok(Self::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: payload.mime_type,
                        data: payload.base64,
                    },
                })
            }
        }
    }
}

impl GeminiRequest {
    fn from_notes_request(req: &NotesRequest) -> Result<Self> {
        let system_instruction = req.system_instruction().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiRequestPart::Text { text }],
        });

        let contents = req
            .conversation()
            .map(|message| {
                let parts = message
                    .parts
                    .iter()
                    .map(GeminiRequestPart::from_part)
                    .collect::<Result<Vec<_>>>()?;
                Ok(GeminiContent {
                    role: Some("user"),
                    parts,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            system_instruction,
            contents,
            generation_config: GeminiConfig {
                temperature: req.params.temperature,
                max_output_tokens: req.params.max_output_tokens,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GeminiResponse {
    fn into_reply(self, model: &str) -> Result<ModelReply> {
        // Prompt blocks come back as HTTP 200
        if let Some(feedback) = self.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(NotesError::ContentBlocked(msg));
            }
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            NotesError::UnexpectedResponse("No candidates in Gemini response".into())
        })?;

        let mut truncated = false;
        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII"
                | "IMAGE_SAFETY" => {
                    return Err(NotesError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {}",
                        finish_reason
                    )));
                }
                "MAX_TOKENS" => truncated = true,
                _ => {} // STOP, etc. are normal
            }
        }

        let content = candidate.content.ok_or_else(|| {
            NotesError::UnexpectedResponse("No content in Gemini candidate".into())
        })?;

        let text: String = content
            .parts
            .into_iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(NotesError::UnexpectedResponse(
                "No text in Gemini response".into(),
            ));
        }

        Ok(ModelReply {
            text,
            model: model.to_string(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenerationParams;
    use crate::prompt::{SYSTEM_INSTRUCTION, USER_INSTRUCTION};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_request() -> NotesRequest {
        let payload = EncodedPayload::from_bytes(b"\xff\xd8\xff", "image/jpeg");
        NotesRequest::for_payload(&payload, GenerationParams::default())
    }

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (base_url, handle)
    }

    #[test]
    fn test_builder_requires_api_key() {
        let err = GeminiProviderBuilder::new().build().err().unwrap();
        assert!(matches!(err, NotesError::Config(ref m) if m.contains("GOOGLE_API_KEY")));

        let err = GeminiProviderBuilder::new().api_key("  ").build().err().unwrap();
        assert!(matches!(err, NotesError::Config(_)));
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = GeminiProviderBuilder::new()
            .api_key("test-key")
            .model("gemini-2.5-flash")
            .build()
            .unwrap();
        assert_eq!(provider.model_id(), "gemini-2.5-flash");
        assert_eq!(provider.name(), "Gemini");
    }

    #[test]
    fn test_builder_defaults() {
        let provider = GeminiProvider::builder().api_key("k").build().unwrap();
        assert_eq!(provider.model_id(), DEFAULT_MODEL);
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_request_construction() {
        let gemini_req = GeminiRequest::from_notes_request(&sample_request()).unwrap();

        let system = gemini_req.system_instruction.as_ref().unwrap();
        assert!(matches!(
            &system.parts[0],
            GeminiRequestPart::Text { text } if text == SYSTEM_INSTRUCTION
        ));

        assert_eq!(gemini_req.contents.len(), 1);
        let user = &gemini_req.contents[0];
        assert_eq!(user.role, Some("user"));
        assert_eq!(user.parts.len(), 2);
        assert!(matches!(
            &user.parts[0],
            GeminiRequestPart::Text { text } if text == USER_INSTRUCTION
        ));
        match &user.parts[1] {
            GeminiRequestPart::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "image/jpeg");
                assert_eq!(inline_data.data, "/9j/");
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }

    #[test]
    fn test_request_rejects_remote_image_urls() {
        let mut request = sample_request();
        request.messages[1].parts[1] = ContentPart::ImageUrl {
            url: "https://example.com/page.jpg".into(),
        };
        assert!(GeminiRequest::from_notes_request(&request).is_err());
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let gemini_req = GeminiRequest::from_notes_request(&sample_request()).unwrap();
        let json = serde_json::to_value(&gemini_req).unwrap();

        assert!(json.get("systemInstruction").is_some());
        assert!(json.get("generationConfig").is_some());
        assert!(json.get("generation_config").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(json["generationConfig"]["temperature"].as_f64().unwrap() as f32, 0.3);
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mimeType"],
            "image/jpeg"
        );
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_response_text_is_passed_through() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "🌟 Lesson\n🔹 शेर"}, {"text": "...\nThe lion..."}]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let reply = resp.into_reply(DEFAULT_MODEL).unwrap();
        assert_eq!(reply.text, "🌟 Lesson\n🔹 शेर...\nThe lion...");
        assert_eq!(reply.model, DEFAULT_MODEL);
        assert!(!reply.truncated);
    }

    #[test]
    fn test_response_skips_thought_parts() {
        let json = r##"{"candidates": [{"content": {"parts": [
            {"text": "planning the layout", "thought": true},
            {"text": "# Notes"}
        ]}}]}"##;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_reply(DEFAULT_MODEL).unwrap().text, "# Notes");
    }

    #[test]
    fn test_response_max_tokens_is_truncated() {
        let json = r##"{"candidates": [{
            "content": {"parts": [{"text": "# Notes\nशेर"}]},
            "finishReason": "MAX_TOKENS"
        }]}"##;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let reply = resp.into_reply(DEFAULT_MODEL).unwrap();
        assert!(reply.truncated);
    }

    #[test]
    fn test_response_with_prompt_feedback_block() {
        let json = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_reply(DEFAULT_MODEL).unwrap_err();
        assert_eq!(err.to_string(), "content blocked: Prompt was blocked due to safety");
    }

    #[test]
    fn test_response_safety_finish_reason() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_reply(DEFAULT_MODEL),
            Err(NotesError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_response_without_candidates_or_text() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(
            resp.into_reply(DEFAULT_MODEL),
            Err(NotesError::UnexpectedResponse(_))
        ));

        let resp: GeminiResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#).unwrap();
        assert!(matches!(
            resp.into_reply(DEFAULT_MODEL),
            Err(NotesError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(parse_error(401, "nope", &headers), NotesError::Auth(_)));
        assert!(matches!(parse_error(403, "nope", &headers), NotesError::Auth(_)));
        assert!(matches!(
            parse_error(404, "", &headers),
            NotesError::InvalidRequest(_)
        ));
        assert!(matches!(
            parse_error(
                400,
                r#"{"error":{"message":"API key not valid. Please pass a valid API key."}}"#,
                &headers
            ),
            NotesError::Auth(ref m) if m == "API key not valid. Please pass a valid API key."
        ));
        assert!(matches!(
            parse_error(500, "internal", &headers),
            NotesError::Api { status: 500, ref message } if message == "internal"
        ));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert!(matches!(
            parse_error(429, "quota", &headers),
            NotesError::RateLimited { retry_after: Some(d) } if d.as_secs() == 30
        ));
    }

    #[tokio::test]
    async fn test_generate_over_http() {
        let (base_url, server) = serve_once(
            "200 OK",
            r##"{"candidates":[{"content":{"parts":[{"text":"# Notes\nशेर\nLion"}]},"finishReason":"STOP"}]}"##,
        )
        .await;

        let provider = GeminiProvider::builder()
            .api_key("test-key")
            .base_url(format!("{base_url}/"))
            .build()
            .unwrap();
        let reply = provider.generate(&sample_request()).await.unwrap();
        assert_eq!(reply.text, "# Notes\nशेर\nLion");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /models/gemini-2.0-flash:generateContent "));
        assert!(raw.to_lowercase().contains("x-goog-api-key: test-key"));
        assert!(raw.contains(r#""maxOutputTokens":4096"#));
        assert!(raw.contains(r#""data":"/9j/""#));
    }

    #[tokio::test]
    async fn test_generate_http_error_status() {
        let (base_url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#,
        )
        .await;

        let provider = GeminiProvider::builder()
            .api_key("test-key")
            .base_url(base_url)
            .build()
            .unwrap();
        let err = provider.generate(&sample_request()).await.unwrap_err();
        assert!(matches!(err, NotesError::RateLimited { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_unreachable_service() {
        // Bind then drop so nothing listens on the port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = GeminiProvider::builder()
            .api_key("test-key")
            .base_url(format!("http://{addr}"))
            .build()
            .unwrap();
        let err = provider.generate(&sample_request()).await.unwrap_err();
        assert!(matches!(err, NotesError::Unavailable(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    fn provider_for(base_url: String) -> GeminiProvider {
        GeminiProvider::builder()
            .api_key("test-key")
            .model("gemini-2.0-flash")
            .base_url(base_url)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let (base_url, server) = serve_once("200 OK", r#"{"name":"models/gemini-2.0-flash"}"#).await;

        provider_for(base_url).health_check().await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /models/gemini-2.0-flash "), "{raw}");
        assert!(raw.to_lowercase().contains("x-goog-api-key: test-key"));
    }

    #[tokio::test]
    async fn test_health_check_rejected_key() {
        let (base_url, server) = serve_once("401 Unauthorized", "{}").await;

        let err = provider_for(base_url).health_check().await.unwrap_err();
        assert!(matches!(err, NotesError::Auth(_)), "{err:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_unknown_model() {
        let (base_url, server) = serve_once("404 Not Found", "{}").await;

        let err = provider_for(base_url).health_check().await.unwrap_err();
        assert!(matches!(err, NotesError::InvalidRequest(_)), "{err:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_server_error() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}").await;

        let err = provider_for(base_url).health_check().await.unwrap_err();
        assert!(matches!(err, NotesError::Api { status: 503, .. }), "{err:?}");
        server.await.unwrap();
    }
}
