pub mod config;
pub mod scoring; // Token log-probabilities → confidence
pub mod llm; // OpenAI-compatible provider client
pub mod extraction; // Concurrent field extraction over page images

use tracing_subscriber::EnvFilter;

pub use config::{ExtractionConfig, LlmConfig, LlmProvider, ScoringConfig};
pub use extraction::{
    extract_fields_async, parse_field_list, read_pages, ExtractionError, ExtractionReport,
    FieldExtractionResult, FieldExtractor,
};
pub use llm::{LlmError, OpenAiClient};
pub use scoring::{
    calculate, calculate_with, ConfidenceLevel, ConfidenceScore, ConfidenceStrategy,
    LogprobScorer, TokenProbabilitySet,
};

/// Install the fmt subscriber, filtered by `RUST_LOG` or
/// `config::default_log_filter()`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::debug!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
}
