//! Provider-neutral model request and the trait model backends implement.

use crate::error::{NotesError, Result};
use crate::prompt::{SYSTEM_INSTRUCTION, USER_INSTRUCTION};
use crate::upload::EncodedPayload;
use async_trait::async_trait;
use serde::Serialize;

/// Default sampling temperature. Kept low so translations stay literal.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Default bound on generated tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Who a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persistent behavior instructions.
    System,
    /// The per-call task.
    User,
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image referenced by URL, here always a base64 data URI.
    ImageUrl {
        /// `data:<mime>;base64,<encoded>`.
        url: String,
    },
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Message content, in order.
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// A system message holding a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// A user message with the given parts.
    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Concatenated text parts of this message.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sampling parameters for a model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    /// Sampling temperature, `0.0..=2.0`.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl GenerationParams {
    /// Rejects parameters the API would refuse.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(NotesError::Config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(NotesError::Config(
                "max output tokens must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A request for study notes: system message, user message, parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotesRequest {
    /// Messages in order.
    pub messages: Vec<Message>,
    /// Sampling parameters.
    pub params: GenerationParams,
}

impl NotesRequest {
    /// Builds the fixed two-message exchange around an encoded page photo.
    pub fn for_payload(payload: &EncodedPayload, params: GenerationParams) -> Self {
        Self {
            messages: vec![
                Message::system(SYSTEM_INSTRUCTION),
                Message::user(vec![
                    ContentPart::Text {
                        text: USER_INSTRUCTION.to_string(),
                    },
                    ContentPart::ImageUrl {
                        url: payload.data_uri(),
                    },
                ]),
            ],
            params,
        }
    }

    /// Text of the system message(s), if any.
    pub fn system_instruction(&self) -> Option<String> {
        let system: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
            .collect();
        (!system.is_empty()).then(|| system.join("\n"))
    }

    /// Non-system messages.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

/// Text returned by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// Generated text, as returned.
    pub text: String,
    /// Model that produced it.
    pub model: String,
    /// True if generation stopped at the output-token bound.
    pub truncated: bool,
}

/// A hosted multimodal model that can turn a page photo into notes.
#[async_trait]
pub trait NotesModel: Send + Sync {
    /// Sends the request and returns the generated text.
    async fn generate(&self, request: &NotesRequest) -> Result<ModelReply>;

    /// Display name of the backend, used in error messages.
    fn name(&self) -> &str;

    /// Model identifier sent to the backend.
    fn model_id(&self) -> &str;

    /// Checks that the backend is reachable and the credentials work.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
impl<T: NotesModel + ?Sized> NotesModel for Box<T> {
    async fn generate(&self, request: &NotesRequest) -> Result<ModelReply> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let payload = EncodedPayload::from_bytes(b"\xff\xd8\xff", "image/jpeg");
        let request = NotesRequest::for_payload(&payload, GenerationParams::default());

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.system_instruction().as_deref(), Some(SYSTEM_INSTRUCTION));

        let user = &request.messages[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(
            user.parts,
            vec![
                ContentPart::Text {
                    text: USER_INSTRUCTION.to_string()
                },
                ContentPart::ImageUrl {
                    url: "data:image/jpeg;base64,/9j/".to_string()
                },
            ]
        );
        assert_eq!(request.conversation().count(), 1);
    }

    #[test]
    fn test_system_instruction_independent_of_image() {
        let a = NotesRequest::for_payload(
            &EncodedPayload::from_bytes(b"first page", "image/png"),
            GenerationParams::default(),
        );
        let b = NotesRequest::for_payload(
            &EncodedPayload::from_bytes(&[0u8; 4096], "image/jpeg"),
            GenerationParams::default(),
        );
        assert_eq!(
            a.system_instruction().unwrap().as_bytes(),
            b.system_instruction().unwrap().as_bytes()
        );
    }

    #[test]
    fn test_default_params() {
        let params = GenerationParams::default();
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.max_output_tokens, 4096);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let hot = GenerationParams {
            temperature: 2.5,
            ..Default::default()
        };
        assert!(matches!(hot.validate(), Err(NotesError::Config(_))));

        let empty = GenerationParams {
            max_output_tokens: 0,
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(NotesError::Config(_))));
    }

    #[test]
    fn test_request_serializes_parts_with_type_tag() {
        let payload = EncodedPayload::from_bytes(b"ab", "image/png");
        let request = NotesRequest::for_payload(&payload, GenerationParams::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["parts"][0]["type"], "text");
        assert_eq!(json["messages"][1]["parts"][1]["type"], "image_url");
        assert_eq!(json["messages"][1]["parts"][1]["url"], "data:image/png;base64,YWI=");
    }
}
