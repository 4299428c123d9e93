//! Confidence scoring backed by a live log-probability source.
//!
//! `LogprobScorer` is the production "score the answer" capability: it asks
//! the source for token log-probabilities and runs the configured strategy.
//! It never fails; every problem resolves to an unavailable score.

use std::sync::Arc;

use crate::config::{supports_logprobs, LlmProvider, ScoringConfig};
use crate::extraction::ConfidenceScorer;
use crate::llm::LlmError;

use super::calculator::calculate_with;
use super::score::ConfidenceScore;
use super::token::TokenProbabilitySet;
use super::ScoringError;

/// Retrieves token log-probabilities for a prompt.
pub trait LogprobSource: Send + Sync {
    fn fetch_logprobs(&self, prompt: &str) -> Result<TokenProbabilitySet, LlmError>;
}

pub struct LogprobScorer {
    source: Arc<dyn LogprobSource>,
    provider: LlmProvider,
    config: ScoringConfig,
}

impl LogprobScorer {
    pub fn new(source: Arc<dyn LogprobSource>, provider: LlmProvider, config: ScoringConfig) -> Self {
        Self {
            source,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score the generation for `prompt`. `response` is the answer already
    /// obtained for it and is only used for diagnostics.
    pub fn calculate_confidence(&self, prompt: &str, response: &str) -> ConfidenceScore {
        if !self.config.enabled {
            return ConfidenceScore::unavailable();
        }
        if !supports_logprobs(self.provider) {
            tracing::debug!(
                provider = %self.provider,
                "Provider does not expose log-probabilities, confidence unavailable"
            );
            return ConfidenceScore::unavailable();
        }

        match self.source.fetch_logprobs(prompt) {
            Ok(set) => {
                let score = self.score_set(&set);
                tracing::debug!(
                    strategy = %self.config.strategy,
                    score = score.score(),
                    tokens = score.total_tokens(),
                    response_chars = response.len(),
                    "Calculated confidence"
                );
                score
            }
            Err(e) => {
                tracing::warn!(error = %e, "Log-probability fetch failed, confidence unavailable");
                ConfidenceScore::unavailable()
            }
        }
    }

    /// Score an already retrieved set with the configured strategy.
    pub fn score_set(&self, set: &TokenProbabilitySet) -> ConfidenceScore {
        if !self.config.enabled {
            return ConfidenceScore::unavailable();
        }
        calculate_with(Some(set), self.config.strategy, &self.config.calibration)
    }
}

impl ConfidenceScorer for LogprobScorer {
    fn score(&self, prompt: &str, response: &str) -> Result<ConfidenceScore, ScoringError> {
        Ok(self.calculate_confidence(prompt, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ConfidenceStrategy, TokenProbability};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockLogprobSource {
        result: Result<Vec<f64>, String>,
        calls: AtomicUsize,
    }

    impl MockLogprobSource {
        fn returning(logprobs: &[f64]) -> Self {
            Self {
                result: Ok(logprobs.to_vec()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LogprobSource for MockLogprobSource {
        fn fetch_logprobs(&self, _prompt: &str) -> Result<TokenProbabilitySet, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(logprobs) => Ok(TokenProbabilitySet::from_tokens(
                    logprobs
                        .iter()
                        .map(|&lp| TokenProbability::simple("t", lp))
                        .collect(),
                )),
                Err(message) => Err(LlmError::HttpClient(message.clone())),
            }
        }
    }

    fn enabled(strategy: ConfidenceStrategy) -> ScoringConfig {
        ScoringConfig {
            enabled: true,
            strategy,
            ..ScoringConfig::default()
        }
    }

    #[test]
    fn disabled_scoring_skips_source() {
        let source = Arc::new(MockLogprobSource::returning(&[-0.1]));
        let scorer = LogprobScorer::new(source.clone(), LlmProvider::OpenAi, ScoringConfig::default());

        let score = scorer.calculate_confidence("prompt", "answer");
        assert!(!score.is_available());
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn unsupported_provider_skips_source() {
        let source = Arc::new(MockLogprobSource::returning(&[-0.1]));
        let scorer = LogprobScorer::new(
            source.clone(),
            LlmProvider::Anthropic,
            enabled(ConfidenceStrategy::TopTokenProb),
        );

        assert!(!scorer.calculate_confidence("prompt", "answer").is_available());
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn groq_is_scored() {
        let source = Arc::new(MockLogprobSource::returning(&[-0.01, -0.02]));
        let scorer = LogprobScorer::new(
            source.clone(),
            LlmProvider::GroqOpenAi,
            enabled(ConfidenceStrategy::TopTokenProb),
        );

        let score = scorer.calculate_confidence("prompt", "answer");
        assert!(score.is_available());
        assert_eq!(score.strategy(), "top_token_prob");
        assert_eq!(score.total_tokens(), 2);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn fetch_error_resolves_to_unavailable() {
        let source = Arc::new(MockLogprobSource::failing("connection reset"));
        let scorer = LogprobScorer::new(
            source,
            LlmProvider::OpenAi,
            enabled(ConfidenceStrategy::EntropyBased),
        );

        assert!(!scorer.calculate_confidence("prompt", "answer").is_available());
    }

    #[test]
    fn empty_logprobs_resolve_to_unavailable() {
        let source = Arc::new(MockLogprobSource::returning(&[]));
        let scorer = LogprobScorer::new(
            source,
            LlmProvider::OpenAi,
            enabled(ConfidenceStrategy::VarianceBased),
        );

        assert!(!scorer.calculate_confidence("prompt", "answer").is_available());
    }

    #[test]
    fn trait_impl_never_errors() {
        let source = Arc::new(MockLogprobSource::failing("boom"));
        let scorer = LogprobScorer::new(
            source,
            LlmProvider::OpenAi,
            enabled(ConfidenceStrategy::EntropyBased),
        );

        let score = ConfidenceScorer::score(&scorer, "prompt", "answer").unwrap();
        assert!(!score.is_available());
    }

    #[test]
    fn configured_calibration_is_applied() {
        let source = Arc::new(MockLogprobSource::returning(&[-20.0]));
        let mut config = enabled(ConfidenceStrategy::AverageLogProb);
        config.calibration.log_prob_floor = -1.0;
        let scorer = LogprobScorer::new(source, LlmProvider::OpenAi, config);

        let score = scorer.calculate_confidence("prompt", "answer");
        assert!((score.score() - (-1.0f64).exp()).abs() < 1e-12);
    }
}
