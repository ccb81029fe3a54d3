//! Provider reply shapes and content extraction
//!
//! Backends answer in the OpenAI chat-completion layout, but a transport may
//! hand the reply over either as raw JSON or already decoded into typed
//! structs. Both expose `choices[0].message.content`; extraction tries the
//! native access path of the shape first and falls back to the other one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Structural mismatch while walking `choices[0].message.content`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{0}` has an unexpected type")]
    WrongType(&'static str),

    #[error("response has no choices")]
    NoChoices,

    #[error("response could not be viewed as {0}")]
    Conversion(&'static str),
}

/// Anything that exposes the primary answer of a chat completion
pub trait ExtractContent {
    /// `Ok(None)` means the path exists but carries no text.
    fn extract_content(&self) -> Result<Option<String>, ShapeError>;
}

/// Typed chat-completion reply (attribute access)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<AssistantMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Single-choice completion, mostly for fakes and tests
    pub fn with_content(content: Option<&str>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![Choice {
                index: 0,
                message: Some(AssistantMessage {
                    role: Some("assistant".to_string()),
                    content: content.map(str::to_string),
                }),
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

impl ExtractContent for ChatCompletion {
    fn extract_content(&self) -> Result<Option<String>, ShapeError> {
        let choice = self.choices.first().ok_or(ShapeError::NoChoices)?;
        let message = choice
            .message
            .as_ref()
            .ok_or(ShapeError::Missing("message"))?;
        Ok(message.content.clone())
    }
}

impl ExtractContent for Value {
    fn extract_content(&self) -> Result<Option<String>, ShapeError> {
        let choices = self
            .get("choices")
            .ok_or(ShapeError::Missing("choices"))?
            .as_array()
            .ok_or(ShapeError::WrongType("choices"))?;
        let message = choices
            .first()
            .ok_or(ShapeError::NoChoices)?
            .get("message")
            .ok_or(ShapeError::Missing("message"))?;
        if !message.is_object() {
            return Err(ShapeError::WrongType("message"));
        }

        match message.get("content") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(_) => Err(ShapeError::WrongType("content")),
        }
    }
}

/// Reply handed back by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// Raw JSON document
    Mapping(Value),
    /// Decoded into typed structs
    Attributes(ChatCompletion),
}

impl ProviderResponse {
    /// Primary textual answer, or `None` when neither access path yields one.
    pub fn content(&self) -> Option<String> {
        match self.extract_content() {
            Ok(content) => content,
            Err(e) => {
                debug!("No content reachable in response: {}", e);
                None
            }
        }
    }

    /// Re-reads the same document through the other view. Both views demand
    /// an object at `choices[0].message` with string-or-null `content`, so a
    /// shape the primary path rejects is rejected here too; only the error
    /// reported can differ.
    fn fallback(&self) -> Result<Option<String>, ShapeError> {
        match self {
            ProviderResponse::Mapping(value) => {
                serde_json::from_value::<ChatCompletion>(value.clone())
                    .map_err(|_| ShapeError::Conversion("typed completion"))?
                    .extract_content()
            }
            ProviderResponse::Attributes(completion) => serde_json::to_value(completion)
                .map_err(|_| ShapeError::Conversion("json document"))?
                .extract_content(),
        }
    }
}

impl ExtractContent for ProviderResponse {
    fn extract_content(&self) -> Result<Option<String>, ShapeError> {
        let primary = match self {
            ProviderResponse::Mapping(value) => value.extract_content(),
            ProviderResponse::Attributes(completion) => completion.extract_content(),
        };

        match primary {
            Ok(content) => Ok(content),
            Err(first) => {
                debug!("Primary access path failed ({}), trying the other shape", first);
                self.fallback()
            }
        }
    }
}

impl From<Value> for ProviderResponse {
    fn from(value: Value) -> Self {
        ProviderResponse::Mapping(value)
    }
}

impl From<ChatCompletion> for ProviderResponse {
    fn from(completion: ChatCompletion) -> Self {
        ProviderResponse::Attributes(completion)
    }
}
