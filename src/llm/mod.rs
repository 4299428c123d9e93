pub mod openai_types;
pub mod openai;

pub use openai_types::*;
pub use openai::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Model provider is not reachable at {0}")]
    Connection(String),

    #[error("Provider returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No API key configured for provider {0}")]
    MissingApiKey(String),

    #[error("Provider {0} has no OpenAI-compatible endpoint")]
    UnsupportedProvider(String),

    #[error("Model returned no answer")]
    EmptyResponse,
}
