// Record Fusion Orchestrator - Three-Source Expediente Consolidation
//
// Builds per-field candidates from the heterogeneous pipelines, derives each
// source's reliability once, delegates every field to the shared decision
// procedure, and aggregates the field outcomes into one routing decision.
// Worst-case outcomes propagate: a single unresolved field routes the whole
// record to manual review.

use std::collections::{BTreeMap, BTreeSet};

use expfuse_common::{Error, FusionCoefficients, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decide::decide;
use crate::reliability::reliability;
use crate::types::{
    ExtractionQualitySignals, FieldCandidate, FieldFusionResult, FusionDecision, SourceKind,
};

/// Field schema of the canonical expediente record.
pub const EXPEDIENTE_FIELDS: [&str; 7] = [
    "numero_expediente",
    "numero_oficio",
    "autoridad",
    "fecha_oficio",
    "tipo_requerimiento",
    "persona",
    "rfc",
];

/// Canonical expediente record, one value slot per schema field. Dates are
/// ISO-8601 strings and amounts canonical decimal strings, exactly as the
/// extraction collaborators deliver them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpedienteRecord {
    pub numero_expediente: Option<String>,
    pub numero_oficio: Option<String>,
    pub autoridad: Option<String>,
    pub fecha_oficio: Option<String>,
    pub tipo_requerimiento: Option<String>,
    pub persona: Option<String>,
    pub rfc: Option<String>,
}

impl ExpedienteRecord {
    /// Value of a schema field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        let slot = match name {
            "numero_expediente" => &self.numero_expediente,
            "numero_oficio" => &self.numero_oficio,
            "autoridad" => &self.autoridad,
            "fecha_oficio" => &self.fecha_oficio,
            "tipo_requerimiento" => &self.tipo_requerimiento,
            "persona" => &self.persona,
            "rfc" => &self.rfc,
            _ => return None,
        };
        slot.as_deref()
    }

    fn set_field(&mut self, name: &str, value: Option<String>) {
        match name {
            "numero_expediente" => self.numero_expediente = value,
            "numero_oficio" => self.numero_oficio = value,
            "autoridad" => self.autoridad = value,
            "fecha_oficio" => self.fecha_oficio = value,
            "tipo_requerimiento" => self.tipo_requerimiento = value,
            "persona" => self.persona = value,
            "rfc" => self.rfc = value,
            _ => {}
        }
    }
}

/// One extraction pipeline's contribution to record fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceExtraction {
    pub kind: SourceKind,
    /// `None` when the pipeline produced no record at all
    pub record: Option<ExpedienteRecord>,
    #[serde(default)]
    pub signals: ExtractionQualitySignals,
}

/// Terminal routing decision for a fused record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    AutoProcess,
    ManualReviewRequired,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextAction::AutoProcess => write!(f, "auto_process"),
            NextAction::ManualReviewRequired => write!(f, "manual_review_required"),
        }
    }
}

/// Whole-record fusion outcome.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFusionResult {
    pub fused_record: ExpedienteRecord,
    pub field_results: BTreeMap<String, FieldFusionResult>,
    /// Mean confidence over fields where at least one source reported a value
    pub overall_confidence: f64,
    /// Fields resolved by vote or left in conflict
    pub conflicting_fields: BTreeSet<String>,
    pub next_action: NextAction,
}

/// Fuse pre-built candidates for a single field. For callers that already
/// hold `FieldCandidate`s instead of full source records.
pub fn fuse_field(
    field_name: &str,
    candidates: &[FieldCandidate],
    coefficients: &FusionCoefficients,
) -> Result<FieldFusionResult> {
    decide(field_name, candidates, coefficients)
}

/// Fuse the heterogeneous source extractions into one authoritative record.
///
/// # Arguments
/// * `sources` - One entry per pipeline; a null record means the pipeline
///   had nothing for this expediente
/// * `coefficients` - Process-wide fusion thresholds
///
/// # Returns
/// * `RecordFusionResult` with the fused record, per-field outcomes, and the
///   terminal routing decision
pub fn fuse_record(
    sources: &[SourceExtraction],
    coefficients: &FusionCoefficients,
) -> Result<RecordFusionResult> {
    let active: Vec<(&SourceExtraction, f64)> = sources
        .iter()
        .filter(|s| s.record.is_some())
        .map(|s| (s, reliability(s.kind, &s.signals)))
        .collect();

    if active.is_empty() {
        return Err(Error::AllSourcesMissing);
    }

    let mut fused_record = ExpedienteRecord::default();
    let mut field_results = BTreeMap::new();
    let mut conflicting_fields = BTreeSet::new();
    let mut any_field_requires_review = false;
    let mut confidence_sum = 0.0;
    let mut populated_fields = 0usize;

    for field_name in EXPEDIENTE_FIELDS {
        let candidates: Vec<FieldCandidate> = active
            .iter()
            .filter_map(|(source, source_reliability)| {
                let record = source.record.as_ref()?;
                Some(FieldCandidate {
                    value: record.field(field_name).map(str::to_string),
                    source_id: source.kind.id().to_string(),
                    reliability: *source_reliability,
                })
            })
            .collect();

        let result = decide(field_name, &candidates, coefficients)?;

        if result.decision.is_contested() {
            conflicting_fields.insert(field_name.to_string());
        }
        if result.requires_manual_review {
            any_field_requires_review = true;
        }
        // Optional fields nobody reported stay out of the record mean.
        if result.decision != FusionDecision::AllSourcesNull {
            confidence_sum += result.confidence;
            populated_fields += 1;
        }

        fused_record.set_field(field_name, result.value.clone());
        field_results.insert(field_name.to_string(), result);
    }

    let overall_confidence = if populated_fields == 0 {
        0.0
    } else {
        (confidence_sum / populated_fields as f64).clamp(0.0, 1.0)
    };

    // A record resting on one weak source is never auto-processed, no matter
    // how internally consistent it looks.
    let single_weak_source =
        active.len() == 1 && active[0].1 < coefficients.manual_review_threshold;

    let next_action = if any_field_requires_review
        || overall_confidence < coefficients.manual_review_threshold
        || single_weak_source
    {
        NextAction::ManualReviewRequired
    } else if overall_confidence >= coefficients.auto_process_threshold {
        NextAction::AutoProcess
    } else {
        // Between the thresholds: route conservatively.
        NextAction::ManualReviewRequired
    };

    if next_action == NextAction::ManualReviewRequired {
        warn!(
            overall_confidence,
            conflicting = conflicting_fields.len(),
            "record routed to manual review"
        );
    } else {
        debug!(overall_confidence, "record auto-processed");
    }

    Ok(RecordFusionResult {
        fused_record,
        field_results,
        overall_confidence,
        conflicting_fields,
        next_action,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(numero: &str, autoridad: &str) -> ExpedienteRecord {
        ExpedienteRecord {
            numero_expediente: Some(numero.to_string()),
            autoridad: Some(autoridad.to_string()),
            ..Default::default()
        }
    }

    fn clean_signals() -> ExtractionQualitySignals {
        ExtractionQualitySignals {
            regex_matches: 7,
            total_fields_extracted: 7,
            catalog_validations: 7,
            pattern_violations: 0,
            ..Default::default()
        }
    }

    fn source(kind: SourceKind, record: Option<ExpedienteRecord>) -> SourceExtraction {
        SourceExtraction {
            kind,
            record,
            signals: clean_signals(),
        }
    }

    #[test]
    fn test_all_sources_missing_is_an_error() {
        let sources = vec![
            source(SourceKind::StructuredFeed, None),
            source(SourceKind::ScannedOcr, None),
        ];
        let err = fuse_record(&sources, &FusionCoefficients::default()).unwrap_err();
        assert!(matches!(err, Error::AllSourcesMissing));
    }

    fn sharp_ocr_signals() -> ExtractionQualitySignals {
        ExtractionQualitySignals {
            mean_ocr_confidence: Some(0.95),
            min_ocr_confidence: Some(0.85),
            quality_index: Some(0.9),
            ..clean_signals()
        }
    }

    #[test]
    fn test_agreeing_sources_fuse_and_auto_process() {
        let sources = vec![
            source(
                SourceKind::StructuredFeed,
                Some(record("A/AS1-1111-222222-AAA", "SAT")),
            ),
            SourceExtraction {
                kind: SourceKind::DocumentOcr,
                record: Some(record("A/AS1-1111-222222-AAA", "SAT")),
                signals: sharp_ocr_signals(),
            },
            SourceExtraction {
                kind: SourceKind::ScannedOcr,
                record: Some(record("A/AS1-1111-222222-AAA", "SAT")),
                signals: sharp_ocr_signals(),
            },
        ];
        let result = fuse_record(&sources, &FusionCoefficients::default()).unwrap();
        assert_eq!(
            result.fused_record.numero_expediente.as_deref(),
            Some("A/AS1-1111-222222-AAA")
        );
        assert!(result.conflicting_fields.is_empty());
        // feed 0.85, doc ~0.93, scan ~0.83 -> mean ~0.87
        assert!(result.overall_confidence > 0.85);
        assert_eq!(result.next_action, NextAction::AutoProcess);
    }

    #[test]
    fn test_absent_fields_stay_out_of_the_mean() {
        let sources = vec![
            source(SourceKind::StructuredFeed, Some(record("EXP-1", "SAT"))),
            source(SourceKind::DocumentOcr, Some(record("EXP-1", "SAT"))),
        ];
        let result = fuse_record(&sources, &FusionCoefficients::default()).unwrap();
        // five schema fields are all-null; only two populated fields count
        let null_fields = result
            .field_results
            .values()
            .filter(|r| r.decision == FusionDecision::AllSourcesNull)
            .count();
        assert_eq!(null_fields, 5);
        let expected = (result.field_results["numero_expediente"].confidence
            + result.field_results["autoridad"].confidence)
            / 2.0;
        assert!((result.overall_confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_conflicting_field_routes_to_review() {
        let sources = vec![
            source(SourceKind::StructuredFeed, Some(record("EXP-1", "SAT"))),
            source(SourceKind::DocumentOcr, Some(record("EXP-2", "SAT"))),
        ];
        let result = fuse_record(&sources, &FusionCoefficients::default()).unwrap();
        assert!(result.conflicting_fields.contains("numero_expediente"));
        assert_eq!(result.next_action, NextAction::ManualReviewRequired);
    }

    #[test]
    fn test_weighted_vote_marks_field_conflicting_without_review_flag() {
        let mut weak = clean_signals();
        weak.regex_matches = 2;
        weak.catalog_validations = 2;
        weak.pattern_violations = 2;
        let sources = vec![
            source(SourceKind::StructuredFeed, Some(record("EXP-1", "SAT"))),
            source(SourceKind::DocumentOcr, Some(record("EXP-1", "SAT"))),
            SourceExtraction {
                kind: SourceKind::ScannedOcr,
                record: Some(record("EXP-9", "SAT")),
                signals: weak,
            },
        ];
        let result = fuse_record(&sources, &FusionCoefficients::default()).unwrap();
        let numero = &result.field_results["numero_expediente"];
        assert!(matches!(
            numero.decision,
            FusionDecision::WeightedVoting { .. }
        ));
        assert!(!numero.requires_manual_review);
        // still surfaced as a conflicting field
        assert!(result.conflicting_fields.contains("numero_expediente"));
    }

    #[test]
    fn test_single_weak_source_forces_review() {
        let mut signals = clean_signals();
        signals.regex_matches = 3;
        signals.catalog_validations = 3;
        let single = SourceExtraction {
            kind: SourceKind::StructuredFeed,
            record: Some(record("EXP-1", "SAT")),
            signals,
        };
        let result = fuse_record(&[single], &FusionCoefficients::default()).unwrap();
        // fields agree trivially, but the lone source is below the threshold
        assert_eq!(
            result.field_results["numero_expediente"].decision,
            FusionDecision::AllAgree
        );
        assert!(result.conflicting_fields.is_empty());
        assert_eq!(result.next_action, NextAction::ManualReviewRequired);
    }

    #[test]
    fn test_single_strong_source_can_auto_process() {
        let single = source(SourceKind::DocumentOcr, Some(record("EXP-1", "SAT")));
        let result = fuse_record(&[single], &FusionCoefficients::default()).unwrap();
        // doc OCR with clean telemetry: 0.6*0.9 + 0.4 = 0.94
        assert!(result.overall_confidence > 0.9);
        assert_eq!(result.next_action, NextAction::AutoProcess);
    }

    #[test]
    fn test_confidence_gap_routes_conservatively() {
        let mut coefficients = FusionCoefficients::default();
        coefficients.manual_review_threshold = 0.5;
        coefficients.auto_process_threshold = 0.99;
        let sources = vec![
            source(SourceKind::StructuredFeed, Some(record("EXP-1", "SAT"))),
            source(SourceKind::ScannedOcr, Some(record("EXP-1", "SAT"))),
        ];
        let result = fuse_record(&sources, &coefficients).unwrap();
        assert!(result.conflicting_fields.is_empty());
        assert!(result.overall_confidence >= 0.5);
        assert!(result.overall_confidence < 0.99);
        assert_eq!(result.next_action, NextAction::ManualReviewRequired);
    }

    #[test]
    fn test_field_access_by_name_round_trips() {
        let mut record = ExpedienteRecord::default();
        for field in EXPEDIENTE_FIELDS {
            record.set_field(field, Some(format!("value-{field}")));
        }
        for field in EXPEDIENTE_FIELDS {
            assert_eq!(record.field(field), Some(format!("value-{field}").as_str()));
        }
        assert_eq!(record.field("unknown"), None);
    }
}
