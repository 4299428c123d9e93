use crate::config::{api_key_env, uses_max_completion_tokens, LlmConfig};
use crate::extraction::{ExtractionError, FieldAsker, PageImage};
use crate::scoring::{LogprobSource, TokenProbabilitySet};

use super::openai_types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use super::LlmError;

/// Blocking client for OpenAI-compatible chat completions (OpenAI, Groq,
/// local gateways).
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    /// Providers with a known key variable must have a key configured.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let base_url = config
            .resolved_base_url()
            .ok_or_else(|| LlmError::UnsupportedProvider(config.provider.to_string()))?;

        if api_key_env(config.provider).is_some() && config.api_key.is_none() {
            return Err(LlmError::MissingApiKey(config.provider.to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            client,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Apply the configured sampling parameters. Reasoning models get
    /// `max_completion_tokens` and no temperature / top_p.
    pub fn build_request(&self, messages: Vec<ChatMessage>, with_logprobs: bool) -> ChatCompletionRequest {
        let reasoning = uses_max_completion_tokens(&self.config.model_name);
        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages,
            logprobs: with_logprobs.then_some(true),
            top_logprobs: with_logprobs.then_some(self.config.top_logprobs),
            max_tokens: (!reasoning).then_some(self.config.max_tokens),
            max_completion_tokens: reasoning.then_some(self.config.max_tokens),
            temperature: (!reasoning).then_some(self.config.temperature),
            top_p: (!reasoning).then_some(self.config.top_p),
        }
    }

    pub fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LlmError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.config.timeout_secs
                ))
            } else {
                LlmError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))
    }
}

impl LogprobSource for OpenAiClient {
    fn fetch_logprobs(&self, prompt: &str) -> Result<TokenProbabilitySet, LlmError> {
        let request = self.build_request(vec![ChatMessage::user_text(prompt)], true);
        let set = self.chat(&request)?.into_token_set();

        tracing::debug!(
            model = %self.config.model_name,
            tokens = set.token_count(),
            "Fetched log-probabilities"
        );
        Ok(set)
    }
}

impl FieldAsker for OpenAiClient {
    fn ask(&self, prompt: &str, page: &PageImage) -> Result<String, ExtractionError> {
        let message = ChatMessage::user_with_image(prompt, page.data_url());
        let request = self.build_request(vec![message], false);
        let response = self.chat(&request)?;

        response
            .first_content()
            .map(str::to_string)
            .ok_or(ExtractionError::Llm(LlmError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn config(provider: LlmProvider, model: &str) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("sk-test".into()),
            model_name: model.into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn client_uses_provider_base_url() {
        let client = OpenAiClient::new(config(LlmProvider::GroqOpenAi, "llama3-70b")).unwrap();
        assert_eq!(client.base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(client.model_name(), "llama3-70b");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let mut cfg = config(LlmProvider::OpenAi, "gpt-4o");
        cfg.base_url = Some("http://localhost:8080/v1/".into());
        let client = OpenAiClient::new(cfg).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut cfg = config(LlmProvider::OpenAi, "gpt-4o");
        cfg.api_key = None;
        assert!(matches!(OpenAiClient::new(cfg), Err(LlmError::MissingApiKey(_))));
    }

    #[test]
    fn local_gateway_needs_no_key() {
        let mut cfg = config(LlmProvider::Ollama, "llava");
        cfg.api_key = None;
        assert!(OpenAiClient::new(cfg).is_ok());
    }

    #[test]
    fn provider_without_endpoint_is_rejected() {
        assert!(matches!(
            OpenAiClient::new(config(LlmProvider::Anthropic, "claude")),
            Err(LlmError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn regular_model_request_carries_sampling_parameters() {
        let client = OpenAiClient::new(config(LlmProvider::OpenAi, "gpt-4o-mini")).unwrap();
        let request = client.build_request(vec![ChatMessage::user_text("hi")], true);
        assert_eq!(request.logprobs, Some(true));
        assert_eq!(request.top_logprobs, Some(5));
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.max_completion_tokens, None);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, Some(0.95));
    }

    #[test]
    fn reasoning_model_request_uses_max_completion_tokens() {
        let client = OpenAiClient::new(config(LlmProvider::OpenAi, "o1-mini")).unwrap();
        let request = client.build_request(vec![ChatMessage::user_text("hi")], true);
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.max_completion_tokens, Some(500));
        assert_eq!(request.temperature, None);
        assert_eq!(request.top_p, None);
    }

    #[test]
    fn ask_request_has_no_logprobs() {
        let client = OpenAiClient::new(config(LlmProvider::OpenAi, "gpt-4o")).unwrap();
        let request = client.build_request(vec![ChatMessage::user_text("hi")], false);
        assert_eq!(request.logprobs, None);
        assert_eq!(request.top_logprobs, None);
    }

    #[test]
    fn unreachable_endpoint_is_connection_error() {
        let mut cfg = config(LlmProvider::OpenAi, "gpt-4o");
        cfg.base_url = Some("http://127.0.0.1:1/v1".into());
        cfg.timeout_secs = 5;
        let client = OpenAiClient::new(cfg).unwrap();
        let result = client.fetch_logprobs("hello");
        assert!(matches!(result, Err(LlmError::Connection(_))));
    }
}
