//! Wire types for OpenAI-compatible `/chat/completions`.
//!
//! Only the fields this crate reads or writes are modelled. Unknown response
//! fields are ignored so Groq and local gateways deserialize the same way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scoring::{AlternativeToken, TokenProbability, TokenProbabilitySet};

// ──────────────────────────────────────────────
// Request
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Reasoning models take this instead of `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user_text(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    /// User message carrying an instruction and one inline image.
    pub fn user_with_image(text: &str, data_url: String) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

// ──────────────────────────────────────────────
// Response
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceLogprobs {
    #[serde(default)]
    pub content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub bytes: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
    }

    /// Token log-probabilities of the first choice. A response without
    /// choices or without logprobs becomes an empty set.
    pub fn into_token_set(self) -> TokenProbabilitySet {
        let mut metadata = BTreeMap::new();
        if let Some(model) = &self.model {
            metadata.insert("model".to_string(), serde_json::json!(model));
        }
        if let Some(created) = self.created {
            metadata.insert("created".to_string(), serde_json::json!(created));
        }
        if let Some(usage) = self.usage {
            metadata.insert("prompt_tokens".to_string(), serde_json::json!(usage.prompt_tokens));
            metadata.insert(
                "completion_tokens".to_string(),
                serde_json::json!(usage.completion_tokens),
            );
            metadata.insert("total_tokens".to_string(), serde_json::json!(usage.total_tokens));
        }

        let Some(choice) = self.choices.into_iter().next() else {
            return TokenProbabilitySet::new(Vec::new(), metadata);
        };
        if let Some(reason) = &choice.finish_reason {
            metadata.insert("finish_reason".to_string(), serde_json::json!(reason));
        }

        let tokens = choice
            .logprobs
            .and_then(|l| l.content)
            .unwrap_or_default()
            .into_iter()
            .map(TokenLogprob::into_token_probability)
            .collect();

        TokenProbabilitySet::new(tokens, metadata)
    }
}

impl TokenLogprob {
    fn into_token_probability(self) -> TokenProbability {
        let alternatives = self
            .top_logprobs
            .into_iter()
            .map(|alt| AlternativeToken::new(alt.token, alt.logprob, alt.bytes.as_deref()))
            .collect();
        TokenProbability::new(self.token, self.logprob, alternatives, self.bytes.as_deref())
    }
}
