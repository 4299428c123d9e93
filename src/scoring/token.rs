use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One candidate the model considered at a generation step besides the token
/// it chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeToken {
    token: String,
    logprob: f64,
    #[serde(default)]
    bytes: Box<[u8]>,
}

impl AlternativeToken {
    pub fn new(token: impl Into<String>, logprob: f64, bytes: Option<&[u8]>) -> Self {
        Self {
            token: token.into(),
            logprob,
            bytes: Box::from(bytes.unwrap_or_default()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn logprob(&self) -> f64 {
        self.logprob
    }

    /// `e^logprob`
    pub fn probability(&self) -> f64 {
        self.logprob.exp()
    }

    /// Owned copy of the token's UTF-8 bytes as reported by the provider.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

/// A generated token with its log-probability and the top-K alternatives
/// considered at the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenProbability {
    token: String,
    logprob: f64,
    #[serde(default)]
    alternatives: Box<[AlternativeToken]>,
    #[serde(default)]
    bytes: Box<[u8]>,
}

impl TokenProbability {
    pub fn new(
        token: impl Into<String>,
        logprob: f64,
        alternatives: Vec<AlternativeToken>,
        bytes: Option<&[u8]>,
    ) -> Self {
        Self {
            token: token.into(),
            logprob,
            alternatives: alternatives.into_boxed_slice(),
            bytes: Box::from(bytes.unwrap_or_default()),
        }
    }

    /// Token without alternatives or byte payload.
    pub fn simple(token: impl Into<String>, logprob: f64) -> Self {
        Self::new(token, logprob, Vec::new(), None)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn logprob(&self) -> f64 {
        self.logprob
    }

    /// `e^logprob`
    pub fn probability(&self) -> f64 {
        self.logprob.exp()
    }

    pub fn alternatives(&self) -> &[AlternativeToken] {
        &self.alternatives
    }

    /// Size of the distribution the entropy is taken over: the selected token
    /// plus its alternatives.
    pub fn candidate_count(&self) -> usize {
        self.alternatives.len() + 1
    }

    /// Owned copy of the token's UTF-8 bytes as reported by the provider.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

/// Counters reported alongside a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Log-probabilities for one generated response, in generation order.
///
/// Metadata (model, finish reason, usage counters) is carried through for
/// callers and never read by the calculator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenProbabilitySet {
    tokens: Box<[TokenProbability]>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl TokenProbabilitySet {
    pub fn new(
        tokens: Vec<TokenProbability>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            tokens: tokens.into_boxed_slice(),
            metadata,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<TokenProbability>) -> Self {
        Self::new(tokens, BTreeMap::new())
    }

    pub fn tokens(&self) -> &[TokenProbability] {
        &self.tokens
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Usage counters from the metadata, when the provider reported them.
    pub fn usage(&self) -> Option<TokenUsage> {
        let counter = |key: &str| self.metadata.get(key).and_then(|v| v.as_u64());
        let total = counter("total_tokens")?;
        Some(TokenUsage {
            input_tokens: counter("prompt_tokens").unwrap_or(0),
            output_tokens: counter("completion_tokens").unwrap_or(0),
            total_tokens: total,
        })
    }

    /// Concatenated token text, i.e. the generated response.
    pub fn text(&self) -> String {
        self.tokens.iter().map(|t| t.token()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_is_exp_of_logprob() {
        let token = TokenProbability::simple("Hello", -0.5);
        assert!((token.probability() - (-0.5f64).exp()).abs() < 1e-12);
        assert!((TokenProbability::simple("x", 0.0).probability() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn candidate_count_includes_selected_token() {
        let token = TokenProbability::new(
            "cat",
            -0.2,
            vec![
                AlternativeToken::new("dog", -2.0, None),
                AlternativeToken::new("cow", -3.0, None),
            ],
            None,
        );
        assert_eq!(token.candidate_count(), 3);
        assert_eq!(TokenProbability::simple("a", -0.1).candidate_count(), 1);
    }

    #[test]
    fn bytes_are_copied_on_read() {
        let token = TokenProbability::new("hi", -0.1, vec![], Some(&b"hi"[..]));
        let mut bytes = token.bytes();
        bytes[0] = b'X';
        assert_eq!(token.bytes(), b"hi".to_vec());
    }

    #[test]
    fn missing_bytes_read_as_empty() {
        let alt = AlternativeToken::new("a", -1.0, None);
        assert!(alt.bytes().is_empty());
    }

    #[test]
    fn empty_set_reports_empty() {
        let set = TokenProbabilitySet::empty();
        assert!(set.is_empty());
        assert_eq!(set.token_count(), 0);
        assert!(set.metadata().is_empty());
    }

    #[test]
    fn tokens_keep_generation_order() {
        let set = TokenProbabilitySet::from_tokens(vec![
            TokenProbability::simple("The", -0.1),
            TokenProbability::simple(" answer", -0.2),
            TokenProbability::simple(" is", -0.3),
        ]);
        assert_eq!(set.token_count(), 3);
        assert_eq!(set.tokens()[1].token(), " answer");
        assert_eq!(set.text(), "The answer is");
    }

    #[test]
    fn usage_read_from_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("prompt_tokens".to_string(), serde_json::json!(12));
        metadata.insert("completion_tokens".to_string(), serde_json::json!(3));
        metadata.insert("total_tokens".to_string(), serde_json::json!(15));
        let set = TokenProbabilitySet::new(vec![], metadata);

        let usage = set.usage().unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn usage_absent_without_counters() {
        assert!(TokenProbabilitySet::empty().usage().is_none());
    }
}
