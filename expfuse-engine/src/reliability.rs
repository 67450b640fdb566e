// Source Reliability Model - Trust Weight from Source Kind + Telemetry
//
// reliability = base(kind) blended with measured extraction quality, then
// clamped to [0,1]. Missing telemetry means "no information", never "bad".

use tracing::debug;

use crate::types::{Confidence, ExtractionQualitySignals, SourceKind};

/// Base reliability per source kind. Structured feeds transcribe accurately
/// but frequently deliver incomplete records; OCR over word-processor
/// originals reads consistently formatted text; scanned PDFs vary wildly in
/// image quality.
const BASE_STRUCTURED_FEED: f64 = 0.75;
const BASE_DOCUMENT_OCR: f64 = 0.90;
const BASE_SCANNED_OCR: f64 = 0.60;

/// Share of the score taken by the identity prior vs measured telemetry.
const BASE_WEIGHT: f64 = 0.6;
const TELEMETRY_WEIGHT: f64 = 0.4;
/// Penalty per hard pattern violation.
const VIOLATION_PENALTY: f64 = 0.05;
/// Blend shares for OCR confidence and image quality, when reported.
const OCR_CONFIDENCE_WEIGHT: f64 = 0.3;
const QUALITY_INDEX_WEIGHT: f64 = 0.2;
/// Below this minimum per-field OCR confidence the extraction contains at
/// least one barely-readable field; penalize proportionally.
const MIN_OCR_FLOOR: f64 = 0.40;
const MIN_OCR_PENALTY_SCALE: f64 = 0.25;

impl SourceKind {
    /// Documented base reliability for this source kind.
    pub fn base_reliability(&self) -> Confidence {
        match self {
            SourceKind::StructuredFeed => BASE_STRUCTURED_FEED,
            SourceKind::DocumentOcr => BASE_DOCUMENT_OCR,
            SourceKind::ScannedOcr => BASE_SCANNED_OCR,
        }
    }
}

/// Compute the trust weight for one source's extraction.
pub fn reliability(kind: SourceKind, signals: &ExtractionQualitySignals) -> Confidence {
    let compliance = ratio_or_full(signals.regex_matches, signals.total_fields_extracted);
    let catalog = ratio_or_full(signals.catalog_validations, signals.total_fields_extracted);
    let telemetry = (compliance + catalog) / 2.0;

    let mut score = BASE_WEIGHT * kind.base_reliability() + TELEMETRY_WEIGHT * telemetry;
    score -= VIOLATION_PENALTY * f64::from(signals.pattern_violations);
    score = score.clamp(0.0, 1.0);

    if let Some(mean) = signals.mean_ocr_confidence {
        let mean = mean.clamp(0.0, 1.0);
        score = (1.0 - OCR_CONFIDENCE_WEIGHT) * score + OCR_CONFIDENCE_WEIGHT * mean;
    }
    if let Some(index) = signals.quality_index {
        let index = index.clamp(0.0, 1.0);
        score = (1.0 - QUALITY_INDEX_WEIGHT) * score + QUALITY_INDEX_WEIGHT * index;
    }
    if let Some(min) = signals.min_ocr_confidence {
        let min = min.clamp(0.0, 1.0);
        if min < MIN_OCR_FLOOR {
            score -= (MIN_OCR_FLOOR - min) * MIN_OCR_PENALTY_SCALE;
        }
    }

    let score = score.clamp(0.0, 1.0);
    debug!(kind = %kind, score, "source reliability computed");
    score
}

/// Ratio with "absence signals no information": zero extracted fields means
/// the pipeline reported nothing to judge, so the ratio defaults to 1.0.
fn ratio_or_full(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        (f64::from(numerator) / f64::from(denominator)).clamp(0.0, 1.0)
    }
}
