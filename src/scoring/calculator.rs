//! Confidence calculation from token log-probabilities.
//!
//! Each strategy is a pure function over the token sequence. Strategies are
//! registered in `STRATEGY_TABLE`; adding one means adding a variant and a
//! table row. Every entry point is fail-soft: empty input, missing input or
//! non-finite arithmetic yields `ConfidenceScore::unavailable()`.

use std::collections::BTreeMap;

use super::score::ConfidenceScore;
use super::strategy::{Calibration, ConfidenceStrategy};
use super::token::{TokenProbability, TokenProbabilitySet};

/// Diagnostic metric keys, grouped by the strategy that emits them.
pub mod metrics {
    pub const AVERAGE_ENTROPY: &str = "average_entropy";
    pub const MAX_POSSIBLE_ENTROPY: &str = "max_possible_entropy";
    pub const ENTROPY_RATIO: &str = "entropy_ratio";

    pub const AVERAGE_PROBABILITY: &str = "average_probability";
    pub const MIN_PROBABILITY: &str = "min_probability";
    pub const MAX_PROBABILITY: &str = "max_probability";
    pub const PROBABILITY_RANGE: &str = "probability_range";

    pub const AVERAGE_LOG_PROB: &str = "average_log_prob";
    pub const MIN_LOG_PROB: &str = "min_log_prob";
    pub const MAX_LOG_PROB: &str = "max_log_prob";
    pub const LOG_PROB_RANGE: &str = "log_prob_range";

    pub const WEIGHTED_ENTROPY: &str = "weighted_entropy";
    pub const TOTAL_WEIGHT: &str = "total_weight";
    pub const ESTIMATED_MAX_ENTROPY: &str = "estimated_max_entropy";

    pub const MEAN_PROBABILITY: &str = "mean_probability";
    pub const VARIANCE: &str = "variance";
    pub const STANDARD_DEVIATION: &str = "standard_deviation";
    pub const CONFIDENCE_FACTOR: &str = "confidence_factor";
}

type Metrics = BTreeMap<String, f64>;

/// Raw (unclamped) confidence plus diagnostics.
type StrategyFn = fn(&[TokenProbability], &Calibration) -> (f64, Metrics);

const STRATEGY_TABLE: &[(ConfidenceStrategy, StrategyFn)] = &[
    (ConfidenceStrategy::EntropyBased, entropy_based),
    (ConfidenceStrategy::TopTokenProb, top_token_prob),
    (ConfidenceStrategy::AverageLogProb, average_log_prob),
    (ConfidenceStrategy::WeightedEntropy, weighted_entropy),
    (ConfidenceStrategy::VarianceBased, variance_based),
];

fn scorer_for(strategy: ConfidenceStrategy) -> StrategyFn {
    STRATEGY_TABLE
        .iter()
        .find(|(s, _)| *s == strategy)
        .map(|(_, f)| *f)
        .unwrap_or(entropy_based)
}

/// Score a token set with the default calibration.
pub fn calculate(
    set: Option<&TokenProbabilitySet>,
    strategy: ConfidenceStrategy,
) -> ConfidenceScore {
    calculate_with(set, strategy, &Calibration::default())
}

/// Score a token set with explicit calibration constants.
pub fn calculate_with(
    set: Option<&TokenProbabilitySet>,
    strategy: ConfidenceStrategy,
    calibration: &Calibration,
) -> ConfidenceScore {
    let Some(set) = set else {
        return ConfidenceScore::unavailable();
    };
    if set.is_empty() {
        return ConfidenceScore::unavailable();
    }

    let tokens = set.tokens();
    if !is_well_formed(tokens) {
        tracing::debug!(
            strategy = strategy.as_str(),
            tokens = tokens.len(),
            "Malformed log-probabilities, confidence unavailable"
        );
        return ConfidenceScore::unavailable();
    }

    let (raw, metrics) = scorer_for(strategy)(tokens, calibration);
    if !raw.is_finite() || metrics.values().any(|v| v.is_nan()) {
        tracing::debug!(
            strategy = strategy.as_str(),
            "Non-finite confidence arithmetic, confidence unavailable"
        );
        return ConfidenceScore::unavailable();
    }
    ConfidenceScore::new(raw, strategy.as_str(), metrics, tokens.len())
}

/// `max(0, x)` that lets NaN through so it can be rejected.
fn non_negative(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

/// NaN or positive-infinite log-probabilities cannot come from a real model.
fn is_well_formed(tokens: &[TokenProbability]) -> bool {
    let valid = |lp: f64| !lp.is_nan() && lp != f64::INFINITY;
    tokens
        .iter()
        .all(|t| valid(t.logprob()) && t.alternatives().iter().all(|a| valid(a.logprob())))
}

/// Shannon entropy (bits) over the selected token and its alternatives.
/// Zero probabilities contribute nothing.
pub fn token_entropy(token: &TokenProbability) -> f64 {
    std::iter::once(token.probability())
        .chain(token.alternatives().iter().map(|a| a.probability()))
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.log2())
        .sum()
}

/// Entropy of a uniform distribution over the token's candidates.
pub fn max_token_entropy(token: &TokenProbability) -> f64 {
    (token.candidate_count().max(1) as f64).log2()
}

/// `e^(-decay * position)`; earlier tokens weigh more.
pub fn position_weight(position: usize, decay: f64) -> f64 {
    (-decay * position as f64).exp()
}

fn entropy_based(tokens: &[TokenProbability], _calibration: &Calibration) -> (f64, Metrics) {
    let count = tokens.len() as f64;
    let total_entropy: f64 = tokens.iter().map(token_entropy).sum();
    let total_max: f64 = tokens.iter().map(max_token_entropy).sum();

    let average_entropy = total_entropy / count;
    let max_average = total_max / count;
    let ratio = if max_average > 0.0 { average_entropy / max_average } else { 0.0 };
    let confidence = if max_average > 0.0 { 1.0 - ratio } else { 0.0 };

    let mut m = BTreeMap::new();
    m.insert(metrics::AVERAGE_ENTROPY.to_string(), average_entropy);
    m.insert(metrics::MAX_POSSIBLE_ENTROPY.to_string(), max_average);
    m.insert(metrics::ENTROPY_RATIO.to_string(), ratio);

    (confidence, m)
}

fn top_token_prob(tokens: &[TokenProbability], _calibration: &Calibration) -> (f64, Metrics) {
    let probabilities: Vec<f64> = tokens.iter().map(|t| t.probability()).collect();
    let average = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
    let min = probabilities.iter().copied().fold(f64::INFINITY, f64::min);
    let max = probabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut m = BTreeMap::new();
    m.insert(metrics::AVERAGE_PROBABILITY.to_string(), average);
    m.insert(metrics::MIN_PROBABILITY.to_string(), min);
    m.insert(metrics::MAX_PROBABILITY.to_string(), max);
    m.insert(metrics::PROBABILITY_RANGE.to_string(), max - min);

    (average, m)
}

fn average_log_prob(tokens: &[TokenProbability], calibration: &Calibration) -> (f64, Metrics) {
    let logprobs: Vec<f64> = tokens.iter().map(|t| t.logprob()).collect();
    let average = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    let min = logprobs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = logprobs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // Very negative means are indistinguishable noise; floor before exp.
    let confidence = average.max(calibration.log_prob_floor).exp();

    let mut m = BTreeMap::new();
    m.insert(metrics::AVERAGE_LOG_PROB.to_string(), average);
    m.insert(metrics::MIN_LOG_PROB.to_string(), min);
    m.insert(metrics::MAX_LOG_PROB.to_string(), max);
    m.insert(metrics::LOG_PROB_RANGE.to_string(), max - min);

    (confidence, m)
}

fn weighted_entropy(tokens: &[TokenProbability], calibration: &Calibration) -> (f64, Metrics) {
    let (weighted_sum, total_weight) = tokens.iter().enumerate().fold(
        (0.0, 0.0),
        |(sum, weights), (i, token)| {
            let weight = position_weight(i, calibration.position_decay);
            (sum + token_entropy(token) * weight, weights + weight)
        },
    );

    let average = if total_weight > 0.0 { weighted_sum / total_weight } else { 0.0 };
    let confidence = non_negative(1.0 - average / calibration.weighted_max_entropy);

    let mut m = BTreeMap::new();
    m.insert(metrics::WEIGHTED_ENTROPY.to_string(), average);
    m.insert(metrics::TOTAL_WEIGHT.to_string(), total_weight);
    m.insert(metrics::ESTIMATED_MAX_ENTROPY.to_string(), calibration.weighted_max_entropy);

    (confidence, m)
}

fn variance_based(tokens: &[TokenProbability], calibration: &Calibration) -> (f64, Metrics) {
    let count = tokens.len() as f64;
    let mean = tokens.iter().map(|t| t.probability()).sum::<f64>() / count;
    let variance = tokens
        .iter()
        .map(|t| {
            let diff = t.probability() - mean;
            diff * diff
        })
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();
    let confidence = non_negative(1.0 - std_dev / calibration.max_expected_std_dev);

    let mut m = BTreeMap::new();
    m.insert(metrics::MEAN_PROBABILITY.to_string(), mean);
    m.insert(metrics::VARIANCE.to_string(), variance);
    m.insert(metrics::STANDARD_DEVIATION.to_string(), std_dev);
    m.insert(metrics::CONFIDENCE_FACTOR.to_string(), confidence);

    (confidence, m)
}
