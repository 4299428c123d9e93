use super::traits::{ConfidenceScorer, FieldAsker};
use super::types::{PageImage, PageResponse};
use super::ExtractionError;

/// Ask `prompt` of every page in order and return one answer per page.
///
/// Unlike field extraction there is no fallback: the first failing page
/// fails the call. Scoring problems only drop that page's confidence.
/// Responses are numbered by their 1-based position in `pages`.
pub fn read_pages(
    prompt: &str,
    pages: &[PageImage],
    asker: &dyn FieldAsker,
    scorer: Option<&dyn ConfidenceScorer>,
) -> Result<Vec<PageResponse>, ExtractionError> {
    let _span = tracing::info_span!("read_pages", pages = pages.len()).entered();

    let mut responses = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        let page_number = index + 1;
        let response = asker.ask(prompt, page).map_err(|e| {
            tracing::warn!(page = page_number, error = %e, "Page read failed");
            e
        })?;

        let confidence = scorer.and_then(|s| match s.score(prompt, &response) {
            Ok(score) => Some(score),
            Err(e) => {
                tracing::warn!(page = page_number, error = %e, "Page scoring failed");
                None
            }
        });

        responses.push(PageResponse {
            page_number,
            response,
            confidence,
        });
    }

    tracing::info!(pages = responses.len(), "Document read complete");
    Ok(responses)
}
