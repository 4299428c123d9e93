use serde::{Deserialize, Serialize};

/// How token log-probabilities are turned into a confidence score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStrategy {
    /// Shannon entropy over each token's candidates, normalized by the
    /// maximum entropy those candidates allow.
    #[default]
    EntropyBased,
    /// Mean probability of the selected tokens.
    TopTokenProb,
    /// Exponentiated mean log-probability.
    AverageLogProb,
    /// Entropy with exponentially decaying position weights.
    WeightedEntropy,
    /// Spread of the selected-token probabilities.
    VarianceBased,
}

impl ConfidenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntropyBased => "entropy_based",
            Self::TopTokenProb => "top_token_prob",
            Self::AverageLogProb => "average_log_prob",
            Self::WeightedEntropy => "weighted_entropy",
            Self::VarianceBased => "variance_based",
        }
    }

    /// Accepts both `entropy_based` and `ENTROPY_BASED` spellings.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entropy_based" => Some(Self::EntropyBased),
            "top_token_prob" => Some(Self::TopTokenProb),
            "average_log_prob" => Some(Self::AverageLogProb),
            "weighted_entropy" => Some(Self::WeightedEntropy),
            "variance_based" => Some(Self::VarianceBased),
            _ => None,
        }
    }

    /// Unknown names fall back to `EntropyBased`.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }

    pub fn all() -> &'static [ConfidenceStrategy] {
        &[
            Self::EntropyBased,
            Self::TopTokenProb,
            Self::AverageLogProb,
            Self::WeightedEntropy,
            Self::VarianceBased,
        ]
    }
}

impl std::fmt::Display for ConfidenceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Empirically chosen constants used by the strategies. The defaults are the
/// production values; override them to calibrate against labelled data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Assumed maximum entropy per token (bits) for `WeightedEntropy`.
    pub weighted_max_entropy: f64,
    /// Decay rate of position weights: `weight(i) = e^(-decay * i)`.
    pub position_decay: f64,
    /// Standard deviation mapped to zero confidence by `VarianceBased`.
    pub max_expected_std_dev: f64,
    /// Mean log-probabilities below this are clamped before exponentiating.
    pub log_prob_floor: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            weighted_max_entropy: 3.0,
            position_decay: 0.1,
            max_expected_std_dev: 0.3,
            log_prob_floor: -10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_roundtrip() {
        for strategy in ConfidenceStrategy::all() {
            assert_eq!(ConfidenceStrategy::from_str(strategy.as_str()), Some(*strategy));
        }
    }

    #[test]
    fn upper_case_names_accepted() {
        assert_eq!(
            ConfidenceStrategy::from_str("WEIGHTED_ENTROPY"),
            Some(ConfidenceStrategy::WeightedEntropy)
        );
    }

    #[test]
    fn unknown_name_falls_back_to_entropy() {
        assert_eq!(ConfidenceStrategy::from_str("median"), None);
        assert_eq!(
            ConfidenceStrategy::from_str_or_default("median"),
            ConfidenceStrategy::EntropyBased
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ConfidenceStrategy::TopTokenProb).unwrap();
        assert_eq!(json, "\"top_token_prob\"");
        let parsed: ConfidenceStrategy = serde_json::from_str("\"variance_based\"").unwrap();
        assert_eq!(parsed, ConfidenceStrategy::VarianceBased);
    }

    #[test]
    fn calibration_defaults() {
        let c = Calibration::default();
        assert_eq!(c.weighted_max_entropy, 3.0);
        assert_eq!(c.position_decay, 0.1);
        assert_eq!(c.max_expected_std_dev, 0.3);
        assert_eq!(c.log_prob_floor, -10.0);
    }

    #[test]
    fn partial_calibration_json_keeps_other_defaults() {
        let c: Calibration = serde_json::from_str(r#"{"position_decay":0.2}"#).unwrap();
        assert_eq!(c.position_decay, 0.2);
        assert_eq!(c.weighted_max_entropy, 3.0);
    }
}
