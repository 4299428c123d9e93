pub mod token;
pub mod score;
pub mod strategy;
pub mod calculator;
pub mod service;

pub use token::*;
pub use score::*;
pub use strategy::*;
pub use calculator::*;
pub use service::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Log-probability source unavailable: {0}")]
    SourceUnavailable(String),
}
