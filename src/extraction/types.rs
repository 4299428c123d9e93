use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::ConfidenceScore;

use super::prompt::is_not_found;

// ═══════════════════════════════════════════
// Pages
// ═══════════════════════════════════════════

/// One rendered document page. The bytes are opaque to extraction; they are
/// only forwarded to the ask capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    page_number: usize,
    bytes: Vec<u8>,
    mime: String,
}

impl PageImage {
    /// `page_number` is 1-based. The MIME type is sniffed from the bytes.
    pub fn new(page_number: usize, bytes: Vec<u8>) -> Self {
        let mime = sniff_mime(&bytes).to_string();
        Self {
            page_number,
            bytes,
            mime,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// `data:<mime>;base64,<payload>` for inline image parts.
    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

// ═══════════════════════════════════════════
// Field results
// ═══════════════════════════════════════════

/// Page number reported for a field that no page contained.
pub const PAGE_NOT_FOUND: i32 = -1;

/// Outcome of searching the document for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExtractionResult {
    field_name: String,
    value: Option<String>,
    /// Present only when scoring was enabled and succeeded.
    confidence: Option<ConfidenceScore>,
    page_number: i32,
    success: bool,
}

impl FieldExtractionResult {
    /// Success is derived from the value: non-empty and not `NOT_FOUND`.
    pub fn new(
        field_name: impl Into<String>,
        value: Option<String>,
        confidence: Option<ConfidenceScore>,
        page_number: i32,
    ) -> Self {
        let success = value.as_deref().is_some_and(|v| !is_not_found(v));
        Self {
            field_name: field_name.into(),
            value,
            confidence,
            page_number,
            success,
        }
    }

    pub fn found(
        field_name: impl Into<String>,
        value: impl Into<String>,
        page_number: usize,
        confidence: Option<ConfidenceScore>,
    ) -> Self {
        let page_number = i32::try_from(page_number).unwrap_or(i32::MAX);
        Self::new(field_name, Some(value.into()), confidence, page_number)
    }

    pub fn not_found(field_name: impl Into<String>) -> Self {
        Self::new(field_name, None, None, PAGE_NOT_FOUND)
    }

    /// Producer override of the derived success flag.
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn confidence(&self) -> Option<&ConfidenceScore> {
        self.confidence.as_ref()
    }

    /// 1-based page, or `-1` when not found.
    pub fn page_number(&self) -> i32 {
        self.page_number
    }

    pub fn page(&self) -> Option<usize> {
        usize::try_from(self.page_number).ok().filter(|&p| p > 0)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

// ═══════════════════════════════════════════
// Report
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionSummary {
    pub total_fields_requested: usize,
    pub total_fields_found: usize,
    /// Mean over every score attached to a found field. Unavailable scores
    /// count as 0.0.
    pub average_confidence: Option<f64>,
}

impl ExtractionSummary {
    pub fn from_results(results: &[FieldExtractionResult]) -> Self {
        let found: Vec<&FieldExtractionResult> = results.iter().filter(|r| r.is_success()).collect();
        let scores: Vec<f64> = found
            .iter()
            .filter_map(|r| r.confidence())
            .map(|c| c.score())
            .collect();

        let average_confidence = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        Self {
            total_fields_requested: results.len(),
            total_fields_found: found.len(),
            average_confidence,
        }
    }
}

/// Result of one extraction run. `results` follow the requested field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_pages: usize,
    pub results: Vec<FieldExtractionResult>,
    pub summary: ExtractionSummary,
}

impl ExtractionReport {
    pub fn result(&self, field_name: &str) -> Option<&FieldExtractionResult> {
        self.results.iter().find(|r| r.field_name() == field_name)
    }

    pub fn found(&self) -> impl Iterator<Item = &FieldExtractionResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Caller-facing document: found fields keyed by name, page count and
    /// summary counters.
    pub fn to_json(&self) -> serde_json::Value {
        let mut fields = serde_json::Map::new();
        for result in self.found() {
            let mut entry = serde_json::Map::new();
            entry.insert("value".into(), serde_json::json!(result.value()));
            entry.insert("page_number".into(), serde_json::json!(result.page_number()));
            if let Some(confidence) = result.confidence() {
                entry.insert("confidence_score".into(), serde_json::json!(confidence.score()));
                entry.insert("confidence_strategy".into(), serde_json::json!(confidence.strategy()));
                entry.insert(
                    "confidence_level".into(),
                    serde_json::json!(confidence.level().as_str()),
                );
                entry.insert("metrics".into(), serde_json::json!(confidence.metrics()));
            }
            fields.insert(result.field_name().to_string(), serde_json::Value::Object(entry));
        }

        let mut summary = serde_json::Map::new();
        summary.insert(
            "total_fields_requested".into(),
            serde_json::json!(self.summary.total_fields_requested),
        );
        summary.insert(
            "total_fields_found".into(),
            serde_json::json!(self.summary.total_fields_found),
        );
        if let Some(average) = self.summary.average_confidence {
            summary.insert("average_confidence".into(), serde_json::json!(average));
        }

        serde_json::json!({
            "fields": fields,
            "total_pages": self.total_pages,
            "extraction_summary": summary,
        })
    }
}

/// One page's answer from a whole-document read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResponse {
    pub page_number: usize,
    pub response: String,
    pub confidence: Option<ConfidenceScore>,
}

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Emitted on the calling thread while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtractionEvent {
    Started {
        fields: usize,
        pages: usize,
    },
    FieldCompleted {
        field: String,
        found: bool,
        page: Option<usize>,
    },
    Completed {
        found: usize,
        requested: usize,
    },
}
