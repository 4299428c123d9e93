use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scoring::{Calibration, ConfidenceStrategy};

/// Application-level constants
pub const APP_NAME: &str = "fieldscore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variables holding provider credentials.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "fieldscore=info"
}

// ═══════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════

/// Whether and how answers are scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scoring costs a second model call per answer, so it is opt-in.
    pub enabled: bool,
    pub strategy: ConfidenceStrategy,
    pub calibration: Calibration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: ConfidenceStrategy::EntropyBased,
            calibration: Calibration::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Model provider
// ═══════════════════════════════════════════════════════════

/// Model provider family. Only some of them expose token log-probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    /// Groq serves the OpenAI wire format.
    GroqOpenAi,
    Ollama,
    Anthropic,
    Other,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "open_ai",
            Self::GroqOpenAi => "groq_open_ai",
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True when the provider returns `logprobs` on chat completions.
pub fn supports_logprobs(provider: LlmProvider) -> bool {
    matches!(provider, LlmProvider::OpenAi | LlmProvider::GroqOpenAi)
}

/// Base URL of the provider's OpenAI-compatible endpoint, if it has one.
pub fn default_base_url(provider: LlmProvider) -> Option<&'static str> {
    match provider {
        LlmProvider::OpenAi => Some("https://api.openai.com/v1"),
        LlmProvider::GroqOpenAi => Some("https://api.groq.com/openai/v1"),
        LlmProvider::Ollama => Some("http://localhost:11434/v1"),
        LlmProvider::Anthropic | LlmProvider::Other => None,
    }
}

/// Environment variable the provider's API key is read from.
pub fn api_key_env(provider: LlmProvider) -> Option<&'static str> {
    match provider {
        LlmProvider::OpenAi => Some(OPENAI_API_KEY_ENV),
        LlmProvider::GroqOpenAi => Some(GROQ_API_KEY_ENV),
        _ => None,
    }
}

static REASONING_MODEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^o([0-9]|-)").expect("static regex"));

/// Reasoning models (o1, o3-mini, ...) reject `max_tokens`, `temperature`
/// and `top_p`; they take `max_completion_tokens` instead.
pub fn uses_max_completion_tokens(model: &str) -> bool {
    let lower = model.to_lowercase();
    REASONING_MODEL_PREFIX.is_match(&lower) || lower.contains("reasoning")
}

/// Connection and sampling parameters for the model provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Overrides `default_base_url(provider)`.
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Alternatives requested per generated token.
    pub top_logprobs: u8,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            base_url: None,
            api_key: None,
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 500,
            timeout_secs: 120,
            top_logprobs: 5,
        }
    }
}

impl LlmConfig {
    /// Fill the API key from the provider's environment variable when unset.
    pub fn with_env_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = api_key_env(self.provider).and_then(|var| std::env::var(var).ok());
        }
        self
    }

    /// Effective base URL without a trailing slash.
    pub fn resolved_base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .or_else(|| default_base_url(self.provider))
            .map(|url| url.trim_end_matches('/').to_string())
    }
}

// ═══════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════

/// Field extraction run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Upper bound on concurrent field tasks. The pool is sized
    /// `min(field_count, max_workers)`.
    pub max_workers: usize,
    /// How long teardown waits for in-flight field tasks.
    pub shutdown_grace_secs: u64,
    /// Appended to every field extraction prompt.
    pub special_instructions: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            shutdown_grace_secs: 60,
            special_instructions: None,
        }
    }
}
