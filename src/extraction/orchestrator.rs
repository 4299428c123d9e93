//! Concurrent field extraction over a rendered document.
//!
//! One task per requested field runs on the blocking pool of a run-scoped
//! tokio runtime, capped at `max_workers` threads. Each task walks the pages
//! in order and stops at the first page that yields an answer. Tasks only share the read-only page list; results come back over
//! a channel tagged with the field's request index, so the report follows
//! request order whatever the completion order.

use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::scoring::ConfidenceScore;

use super::prompt::{build_field_prompt, is_not_found, normalize_fields};
use super::traits::{ConfidenceScorer, FieldAsker, PageSource};
use super::types::{
    ExtractionEvent, ExtractionReport, ExtractionSummary, FieldExtractionResult, PageImage,
};
use super::ExtractionError;

pub struct FieldExtractor {
    asker: Arc<dyn FieldAsker>,
    scorer: Option<Arc<dyn ConfidenceScorer>>,
    config: ExtractionConfig,
}

impl FieldExtractor {
    /// Extractor without scoring; answers carry no confidence.
    pub fn new(asker: Arc<dyn FieldAsker>, config: ExtractionConfig) -> Self {
        Self {
            asker,
            scorer: None,
            config,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Load pages from `source`, then extract. An unreadable source aborts
    /// the run before any field is searched.
    pub fn extract_from_source(
        &self,
        fields: &[String],
        source: &dyn PageSource,
        progress_fn: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<ExtractionReport, ExtractionError> {
        let pages = source.load_pages().map_err(|e| {
            tracing::error!(source = %source.describe(), error = %e, "Page source unreadable");
            e
        })?;
        self.extract_fields(fields, pages, progress_fn)
    }

    /// Search every page for every field, one concurrent task per field.
    ///
    /// Blocks until all field tasks have finished, so async callers go
    /// through `extract_fields_async`. Per-page and per-field failures are
    /// absorbed into not-found results.
    pub fn extract_fields(
        &self,
        fields: &[String],
        pages: Vec<PageImage>,
        progress_fn: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<ExtractionReport, ExtractionError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let fields = normalize_fields(fields);
        let total_pages = pages.len();

        let _span = tracing::info_span!(
            "field_extraction",
            run_id = %run_id,
            fields = fields.len(),
            pages = total_pages,
        )
        .entered();

        if let Some(progress) = progress_fn {
            progress(ExtractionEvent::Started {
                fields: fields.len(),
                pages: total_pages,
            });
        }

        let results = if fields.is_empty() {
            Vec::new()
        } else {
            self.run_field_tasks(&fields, pages.into(), progress_fn)?
        };

        let summary = ExtractionSummary::from_results(&results);
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(progress) = progress_fn {
            progress(ExtractionEvent::Completed {
                found: summary.total_fields_found,
                requested: summary.total_fields_requested,
            });
        }

        tracing::info!(
            requested = summary.total_fields_requested,
            found = summary.total_fields_found,
            average_confidence = ?summary.average_confidence,
            duration_ms,
            "Field extraction complete"
        );

        Ok(ExtractionReport {
            run_id,
            started_at,
            duration_ms,
            total_pages,
            results,
            summary,
        })
    }

    fn run_field_tasks(
        &self,
        fields: &[String],
        pages: Arc<[PageImage]>,
        progress_fn: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<Vec<FieldExtractionResult>, ExtractionError> {
        let pool_size = fields.len().min(self.config.max_workers).max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(pool_size)
            .thread_name("field-extract")
            .build()
            .map_err(|e| ExtractionError::WorkerPool(format!("Failed to start field runtime: {e}")))?;
        tracing::info!(pool_size, "Starting field tasks");

        let instructions: Option<Arc<str>> = self
            .config
            .special_instructions
            .as_deref()
            .map(Arc::from);

        let mut slots: Vec<Option<FieldExtractionResult>> = vec![None; fields.len()];
        let (tx, rx) = mpsc::channel::<(usize, FieldExtractionResult)>();

        for (index, field) in fields.iter().enumerate() {
            let tx = tx.clone();
            let field = field.clone();
            let pages = pages.clone();
            let asker = self.asker.clone();
            let scorer = self.scorer.clone();
            let instructions = instructions.clone();

            // Tasks past the thread cap wait in the runtime's blocking queue.
            drop(runtime.spawn_blocking(move || {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    extract_field(
                        &field,
                        &pages,
                        asker.as_ref(),
                        scorer.as_deref(),
                        instructions.as_deref(),
                    )
                }));
                let result = outcome.unwrap_or_else(|_| {
                    tracing::error!(field = %field, "Field task panicked");
                    FieldExtractionResult::not_found(field.as_str())
                });
                let _ = tx.send((index, result));
            }));
        }
        drop(tx);

        // Ends once every task has sent its result or been dropped.
        for (index, result) in rx.iter() {
            if let Some(progress) = progress_fn {
                progress(ExtractionEvent::FieldCompleted {
                    field: result.field_name().to_string(),
                    found: result.is_success(),
                    page: result.page(),
                });
            }
            slots[index] = Some(result);
        }

        // Threads still busy after the grace period are detached.
        runtime.shutdown_timeout(Duration::from_secs(self.config.shutdown_grace_secs));

        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    tracing::error!(field = %field_name_at(fields, index), "Field task produced no result");
                    FieldExtractionResult::not_found(field_name_at(fields, index))
                })
            })
            .collect())
    }
}

fn field_name_at(fields: &[String], index: usize) -> &str {
    fields.get(index).map(String::as_str).unwrap_or_default()
}

/// Scan `pages` in order for one field; first answer wins.
///
/// The reported page is the 1-based position in `pages`, whatever numbers
/// the caller put on the images.
/// A failed ask is logged and the scan moves on to the next page. A scoring
/// failure keeps the answer and leaves its confidence absent.
pub fn extract_field(
    field_name: &str,
    pages: &[PageImage],
    asker: &dyn FieldAsker,
    scorer: Option<&dyn ConfidenceScorer>,
    special_instructions: Option<&str>,
) -> FieldExtractionResult {
    let prompt = build_field_prompt(field_name, special_instructions);

    for (index, page) in pages.iter().enumerate() {
        let page_number = index + 1;
        let answer = match asker.ask(&prompt, page) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(
                    field = %field_name,
                    page = page_number,
                    error = %e,
                    "Page ask failed, continuing with next page"
                );
                continue;
            }
        };

        let answer = answer.trim();
        if is_not_found(answer) {
            tracing::debug!(field = %field_name, page = page_number, "Field not on page");
            continue;
        }

        let confidence = scorer.and_then(|s| score_answer(s, field_name, &prompt, answer));
        tracing::debug!(
            field = %field_name,
            page = page_number,
            score = ?confidence.as_ref().map(ConfidenceScore::score),
            "Field found"
        );
        return FieldExtractionResult::found(field_name, answer, page_number, confidence);
    }

    FieldExtractionResult::not_found(field_name)
}

fn score_answer(
    scorer: &dyn ConfidenceScorer,
    field_name: &str,
    prompt: &str,
    answer: &str,
) -> Option<ConfidenceScore> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| scorer.score(prompt, answer))) {
        Ok(Ok(score)) => Some(score),
        Ok(Err(e)) => {
            tracing::warn!(field = %field_name, error = %e, "Scoring failed, keeping answer without confidence");
            None
        }
        Err(_) => {
            tracing::error!(field = %field_name, "Scorer panicked, keeping answer without confidence");
            None
        }
    }
}

/// Run `extract_fields` on the blocking thread pool for async callers.
pub async fn extract_fields_async(
    extractor: Arc<FieldExtractor>,
    fields: Vec<String>,
    pages: Vec<PageImage>,
) -> Result<ExtractionReport, ExtractionError> {
    tokio::task::spawn_blocking(move || extractor.extract_fields(&fields, pages, None))
        .await
        .map_err(|e| ExtractionError::TaskJoin(e.to_string()))?
}
