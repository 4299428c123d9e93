//! Capabilities the extraction run depends on.
//!
//! - FieldAsker: asks the model a question about one page image
//! - ConfidenceScorer: scores an answer given the prompt that produced it
//! - PageSource: supplies the rendered pages before a run starts

use crate::scoring::{ConfidenceScore, ScoringError};

use super::types::PageImage;
use super::ExtractionError;

/// Maps (instruction, page image) to the model's text answer.
pub trait FieldAsker: Send + Sync {
    fn ask(&self, prompt: &str, page: &PageImage) -> Result<String, ExtractionError>;
}

/// Scores a generated answer. Errors are tolerated by callers: the answer is
/// kept and the confidence left absent.
pub trait ConfidenceScorer: Send + Sync {
    fn score(&self, prompt: &str, response: &str) -> Result<ConfidenceScore, ScoringError>;
}

/// Produces the ordered page list. Failing here is fatal for the run.
pub trait PageSource {
    fn load_pages(&self) -> Result<Vec<PageImage>, ExtractionError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
