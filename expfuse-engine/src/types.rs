// Core data model for multi-source expediente fusion
//
// Per-source candidates in, fused field results out. Record-level types live
// in record.rs; everything here is shared by both fusion entry points.

use serde::{Deserialize, Serialize};

/// Trust / confidence score (0.0-1.0)
pub type Confidence = f64;

/// Canonical extraction source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Structured feed parser. Accurate values, but records are often
    /// incomplete upstream.
    StructuredFeed,
    /// OCR over word-processor originals with a consistent layout.
    DocumentOcr,
    /// OCR over scanned PDFs of widely varying image quality.
    ScannedOcr,
}

impl SourceKind {
    /// Stable identifier used as candidate source id and in priority lists.
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::StructuredFeed => "structured_feed",
            SourceKind::DocumentOcr => "document_ocr",
            SourceKind::ScannedOcr => "scanned_ocr",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One source's reported value for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCandidate {
    /// Reported value; `None` (or blank) means the source had nothing
    pub value: Option<String>,
    /// Identifier of the producing source
    pub source_id: String,
    /// Trust weight for this source's output (0.0-1.0)
    pub reliability: Confidence,
}

impl FieldCandidate {
    pub fn present(value: impl Into<String>, source_id: impl Into<String>, reliability: Confidence) -> Self {
        Self {
            value: Some(value.into()),
            source_id: source_id.into(),
            reliability: reliability.clamp(0.0, 1.0),
        }
    }

    pub fn absent(source_id: impl Into<String>, reliability: Confidence) -> Self {
        Self {
            value: None,
            source_id: source_id.into(),
            reliability: reliability.clamp(0.0, 1.0),
        }
    }

    /// The value, if it is non-blank. Whitespace-only values count as absent.
    pub fn present_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Per-source extraction quality telemetry.
///
/// Counts come from the extraction collaborators; OCR-only fields are absent
/// for non-OCR sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionQualitySignals {
    /// Fields whose value matched the expected pattern
    pub regex_matches: u32,
    /// Total fields the pipeline extracted for this record
    pub total_fields_extracted: u32,
    /// Fields whose value validated against the reference catalogs
    pub catalog_validations: u32,
    /// Hard pattern violations observed during extraction
    pub pattern_violations: u32,
    /// Mean per-field OCR confidence (0.0-1.0), OCR sources only
    pub mean_ocr_confidence: Option<f64>,
    /// Lowest per-field OCR confidence (0.0-1.0), OCR sources only
    pub min_ocr_confidence: Option<f64>,
    /// Source image quality index (0.0-1.0), OCR sources only
    pub quality_index: Option<f64>,
}

/// How a field's candidates were resolved.
///
/// Variant payloads carry only the data that decision produced, so a
/// fuzzy similarity can never appear on a conflict and a winning source can
/// never appear on unanimous agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FusionDecision {
    /// No source produced a value
    AllSourcesNull,
    /// Every present value identical after normalization
    AllAgree,
    /// Present values near-equal under edit-distance similarity
    FuzzyAgreement {
        /// Minimum observed pairwise similarity
        similarity: f64,
    },
    /// One value out-voted the rest by at least the weight margin
    WeightedVoting {
        /// Source id of the winning value's highest-reliability holder
        winning_source: String,
    },
    /// No value carried a decisive weight advantage
    Conflict,
}

impl FusionDecision {
    pub fn label(&self) -> &'static str {
        match self {
            FusionDecision::AllSourcesNull => "all_sources_null",
            FusionDecision::AllAgree => "all_agree",
            FusionDecision::FuzzyAgreement { .. } => "fuzzy_agreement",
            FusionDecision::WeightedVoting { .. } => "weighted_voting",
            FusionDecision::Conflict => "conflict",
        }
    }

    /// Decisions the record level surfaces as conflicting fields.
    pub fn is_contested(&self) -> bool {
        matches!(
            self,
            FusionDecision::WeightedVoting { .. } | FusionDecision::Conflict
        )
    }

    pub fn fuzzy_similarity(&self) -> Option<f64> {
        match self {
            FusionDecision::FuzzyAgreement { similarity } => Some(*similarity),
            _ => None,
        }
    }

    pub fn winning_source(&self) -> Option<&str> {
        match self {
            FusionDecision::WeightedVoting { winning_source } => Some(winning_source),
            _ => None,
        }
    }
}

impl std::fmt::Display for FusionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Fused outcome for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFusionResult {
    pub field_name: String,
    #[serde(flatten)]
    pub decision: FusionDecision,
    /// Authoritative value; display-only when the decision is `Conflict`
    pub value: Option<String>,
    /// Calibrated confidence in the value (0.0-1.0)
    pub confidence: Confidence,
    /// Whether this field alone forces the record into manual review
    pub requires_manual_review: bool,
}
