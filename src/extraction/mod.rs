pub mod types;
pub mod traits;
pub mod prompt;
pub mod pages;
pub mod orchestrator;
pub mod scan;

pub use types::*;
pub use traits::*;
pub use prompt::*;
pub use pages::*;
pub use orchestrator::*;
pub use scan::*;

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Page source unreadable ({source_name}): {reason}")]
    PageSourceUnreadable { source_name: String, reason: String },

    #[error("Page {page} could not be decoded: {reason}")]
    PageSourceDecode { page: usize, reason: String },

    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Ask failed: {0}")]
    Ask(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl ExtractionError {
    /// Only an unreadable page source stops a whole extraction run.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::PageSourceUnreadable { .. } | Self::PageSourceDecode { .. }
        )
    }
}
