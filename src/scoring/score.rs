use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Strategy name carried by an unavailable score.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// Lower bounds of each confidence tier (inclusive).
pub mod thresholds {
    pub const VERY_HIGH: f64 = 0.90;
    pub const HIGH: f64 = 0.75;
    pub const MEDIUM: f64 = 0.50;
    pub const LOW: f64 = 0.25;
}

/// Human-readable tier of a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Unavailable,
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Pure function of `(available, score)`; never stored.
    pub fn classify(available: bool, score: f64) -> Self {
        if !available {
            return Self::Unavailable;
        }
        if score >= thresholds::VERY_HIGH {
            Self::VeryHigh
        } else if score >= thresholds::HIGH {
            Self::High
        } else if score >= thresholds::MEDIUM {
            Self::Medium
        } else if score >= thresholds::LOW {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::VeryLow => "VERY_LOW",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY_HIGH",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trustworthiness of one generated response, in `[0, 1]`.
///
/// Built once and read-only afterwards. Metrics are diagnostics emitted by the
/// strategy that produced the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceScore {
    score: f64,
    strategy: String,
    metrics: BTreeMap<String, f64>,
    total_tokens: usize,
    available: bool,
}

impl ConfidenceScore {
    /// Available score; `score` is clamped into `[0, 1]` (NaN becomes 0).
    pub fn new(
        score: f64,
        strategy: impl Into<String>,
        metrics: BTreeMap<String, f64>,
        total_tokens: usize,
    ) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            score,
            strategy: strategy.into(),
            metrics,
            total_tokens,
            available: true,
        }
    }

    /// Sentinel for "could not compute".
    pub fn unavailable() -> Self {
        Self {
            score: 0.0,
            strategy: UNAVAILABLE.to_string(),
            metrics: BTreeMap::new(),
            total_tokens: 0,
            available: false,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::classify(self.available, self.score)
    }
}

impl std::fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConfidenceScore{{score={:.3}, level={}, strategy={}, tokens={}, available={}}}",
            self.score,
            self.level(),
            self.strategy,
            self.total_tokens,
            self.available
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn score_of(value: f64) -> ConfidenceScore {
        ConfidenceScore::new(value, "test", BTreeMap::new(), 1)
    }

    #[test]
    fn construction_clamps_above_one() {
        assert_eq!(score_of(1.5).score(), 1.0);
    }

    #[test]
    fn construction_clamps_below_zero() {
        assert_eq!(score_of(-0.5).score(), 0.0);
    }

    #[test]
    fn nan_score_stored_as_zero() {
        assert_eq!(score_of(f64::NAN).score(), 0.0);
    }

    #[test]
    fn unavailable_sentinel_shape() {
        let score = ConfidenceScore::unavailable();
        assert!(!score.is_available());
        assert_eq!(score.strategy(), "UNAVAILABLE");
        assert!(score.metrics().is_empty());
        assert_eq!(score.total_tokens(), 0);
        assert_eq!(score.score(), 0.0);
        assert_eq!(score.level(), ConfidenceLevel::Unavailable);
    }

    #[test]
    fn level_examples() {
        assert_eq!(score_of(0.95).level(), ConfidenceLevel::VeryHigh);
        assert_eq!(score_of(0.8).level(), ConfidenceLevel::High);
        assert_eq!(score_of(0.6).level(), ConfidenceLevel::Medium);
        assert_eq!(score_of(0.3).level(), ConfidenceLevel::Low);
        assert_eq!(score_of(0.1).level(), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn level_bounds_are_inclusive() {
        assert_eq!(score_of(0.9).level(), ConfidenceLevel::VeryHigh);
        assert_eq!(score_of(0.75).level(), ConfidenceLevel::High);
        assert_eq!(score_of(0.5).level(), ConfidenceLevel::Medium);
        assert_eq!(score_of(0.25).level(), ConfidenceLevel::Low);
    }

    #[test]
    fn level_strings() {
        assert_eq!(ConfidenceLevel::VeryHigh.as_str(), "VERY_HIGH");
        assert_eq!(ConfidenceLevel::Unavailable.to_string(), "UNAVAILABLE");
        let json = serde_json::to_string(&ConfidenceLevel::VeryLow).unwrap();
        assert_eq!(json, "\"VERY_LOW\"");
    }

    #[test]
    fn caller_map_changes_do_not_leak_into_score() {
        let mut metrics = BTreeMap::new();
        metrics.insert("average_entropy".to_string(), 0.4);
        let score = ConfidenceScore::new(0.7, "entropy_based", metrics.clone(), 3);

        metrics.insert("average_entropy".to_string(), 9.9);
        metrics.insert("injected".to_string(), 1.0);

        assert_eq!(score.metric("average_entropy"), Some(0.4));
        assert_eq!(score.metric("injected"), None);
        assert_eq!(score.metrics().len(), 1);
    }

    #[test]
    fn display_includes_level() {
        let text = score_of(0.8).to_string();
        assert!(text.contains("score=0.800"));
        assert!(text.contains("level=HIGH"));
    }

    #[test]
    fn serializes_stored_fields() {
        let json = serde_json::to_value(score_of(0.5)).unwrap();
        assert_eq!(json["score"], 0.5);
        assert_eq!(json["strategy"], "test");
        assert_eq!(json["available"], true);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: any raw input ends up inside [0, 1].
        #[test]
        fn stored_score_always_in_unit_interval(raw in proptest::num::f64::ANY) {
            let score = score_of(raw);
            prop_assert!((0.0..=1.0).contains(&score.score()));
        }

        /// Property: a higher score never lands in a lower tier.
        #[test]
        fn level_is_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let rank = |level: ConfidenceLevel| match level {
                ConfidenceLevel::Unavailable => 0,
                ConfidenceLevel::VeryLow => 1,
                ConfidenceLevel::Low => 2,
                ConfidenceLevel::Medium => 3,
                ConfidenceLevel::High => 4,
                ConfidenceLevel::VeryHigh => 5,
            };
            prop_assert!(rank(score_of(lo).level()) <= rank(score_of(hi).level()));
        }
    }
}
