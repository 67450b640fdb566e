// Field Matching Policy - Symmetric Redundant-Extraction Resolution
//
// For N homogeneous, equally-trusted extractors reporting the same field.
// Each candidate's self-reported confidence doubles as its reliability and
// the conflict threshold stands in for the weight margin; the decision
// ladder itself is the shared one in decide.rs.

use std::collections::BTreeMap;

use expfuse_common::{Error, FusionCoefficients, MatchingPolicyOptions, Result};
use expfuse_common::config::EffectiveFieldPolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decide::decide;
use crate::similarity::normalize;
use crate::types::{Confidence, FieldCandidate, FieldFusionResult};

/// One extractor's report for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub field_name: String,
    pub value: Option<String>,
    /// Extractor's self-reported confidence, used as the trust weight
    pub confidence: Confidence,
    pub source_id: String,
}

impl ExtractedValue {
    pub fn new(
        field_name: impl Into<String>,
        value: Option<String>,
        confidence: Confidence,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source_id: source_id.into(),
        }
    }

    fn present_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Outcome of `select_best_value`.
#[derive(Debug, Clone, Serialize)]
pub struct BestValueSelection {
    pub value: Option<String>,
    /// Fraction of present candidates equal to the chosen value
    pub agreement_level: f64,
    pub has_conflict: bool,
}

/// One merged-field conflict entry, kept for explainability.
#[derive(Debug, Clone, Serialize)]
pub struct FieldConflict {
    pub field_name: String,
    pub conflicting_values: Vec<String>,
    pub resolved_value: Option<String>,
    pub resolution_strategy: String,
}

/// Merge outcome across redundant extraction sets.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub merged: BTreeMap<String, Option<String>>,
    pub conflicts: Vec<FieldConflict>,
    /// Extraction sets that contributed at least one present value
    pub contributing_sources: usize,
}

/// Symmetric matching policy over redundant extractions.
pub struct FieldMatchingPolicy {
    options: MatchingPolicyOptions,
}

impl Default for FieldMatchingPolicy {
    fn default() -> Self {
        Self::new(MatchingPolicyOptions::default())
    }
}

impl FieldMatchingPolicy {
    pub fn new(options: MatchingPolicyOptions) -> Self {
        Self {
            options: options.sanitized(),
        }
    }

    /// Resolve one field from redundant extractions.
    ///
    /// # Returns
    /// * Chosen value, agreement level, and whether the field was contested
    pub fn select_best_value(
        &self,
        field_name: &str,
        values: &[ExtractedValue],
    ) -> Result<BestValueSelection> {
        let (result, policy) = self.fuse(field_name, values)?;
        let agreement_level = agreement_level_for(&result, values, &policy);
        Ok(BestValueSelection {
            has_conflict: result.decision.is_contested(),
            value: result.value,
            agreement_level,
        })
    }

    /// Fraction of present candidates that agree with the resolved value.
    /// The field is taken from the entries themselves.
    pub fn calculate_agreement_level(&self, values: &[ExtractedValue]) -> Result<f64> {
        let field_name = field_name_of(values)?;
        let (result, policy) = self.fuse(&field_name, values)?;
        Ok(agreement_level_for(&result, values, &policy))
    }

    /// Whether the field's candidates end in a contested decision.
    pub fn has_conflict(&self, values: &[ExtractedValue]) -> Result<bool> {
        let field_name = field_name_of(values)?;
        let (result, _) = self.fuse(&field_name, values)?;
        Ok(result.decision.is_contested())
    }

    /// Merge N extraction sets covering many fields into one record-shaped
    /// map, with per-field conflict entries for everything contested.
    pub fn merge_extractions(&self, sources: &[Vec<ExtractedValue>]) -> Result<MergeResult> {
        if sources.is_empty() {
            return Err(Error::Validation(
                "merge requires at least one extraction set".into(),
            ));
        }

        let contributing_sources = sources
            .iter()
            .filter(|set| set.iter().any(|v| v.present_value().is_some()))
            .count();

        let mut by_field: BTreeMap<String, Vec<ExtractedValue>> = BTreeMap::new();
        for set in sources {
            for value in set {
                by_field
                    .entry(value.field_name.clone())
                    .or_default()
                    .push(value.clone());
            }
        }

        let mut merged = BTreeMap::new();
        let mut conflicts = Vec::new();
        for (field_name, values) in &by_field {
            let (result, _) = self.fuse(field_name, values)?;
            if result.decision.is_contested() {
                conflicts.push(FieldConflict {
                    field_name: field_name.clone(),
                    conflicting_values: distinct_present_values(values),
                    resolved_value: result.value.clone(),
                    resolution_strategy: result.decision.label().to_string(),
                });
            }
            merged.insert(field_name.clone(), result.value);
        }

        debug!(
            fields = merged.len(),
            conflicts = conflicts.len(),
            contributing_sources,
            "extraction sets merged"
        );
        Ok(MergeResult {
            merged,
            conflicts,
            contributing_sources,
        })
    }

    /// Delegate to the shared decision procedure under this field's
    /// effective policy.
    fn fuse(
        &self,
        field_name: &str,
        values: &[ExtractedValue],
    ) -> Result<(FieldFusionResult, EffectiveFieldPolicy)> {
        if values.is_empty() {
            return Err(Error::Validation(format!(
                "field '{field_name}': no extracted values supplied"
            )));
        }
        let policy = self.options.for_field(field_name);

        // Below the confidence floor a candidate is treated as absent.
        let candidates: Vec<FieldCandidate> = values
            .iter()
            .map(|v| {
                let value = if v.confidence < policy.minimum_confidence {
                    None
                } else {
                    v.value.clone()
                };
                FieldCandidate {
                    value,
                    source_id: v.source_id.clone(),
                    reliability: v.confidence.clamp(0.0, 1.0),
                }
            })
            .collect();

        let coefficients = FusionCoefficients {
            weight_margin: policy.conflict_threshold,
            source_priority: policy.source_priority.clone(),
            ..FusionCoefficients::default()
        };

        let result = decide(field_name, &candidates, &coefficients)?;
        Ok((result, policy))
    }
}

fn field_name_of(values: &[ExtractedValue]) -> Result<String> {
    values
        .first()
        .map(|v| v.field_name.clone())
        .ok_or_else(|| Error::Validation("no extracted values supplied".into()))
}

/// Fraction of present, above-floor candidates whose normalized value equals
/// the chosen one. 0.0 when nothing was present.
fn agreement_level_for(
    result: &FieldFusionResult,
    values: &[ExtractedValue],
    policy: &EffectiveFieldPolicy,
) -> f64 {
    let Some(chosen) = result.value.as_deref() else {
        return 0.0;
    };
    let chosen_norm = normalize(chosen);
    let present: Vec<&ExtractedValue> = values
        .iter()
        .filter(|v| v.confidence >= policy.minimum_confidence)
        .filter(|v| v.present_value().is_some())
        .collect();
    if present.is_empty() {
        return 0.0;
    }
    let agreeing = present
        .iter()
        .filter_map(|v| v.present_value())
        .filter(|text| normalize(text) == chosen_norm)
        .count();
    agreeing as f64 / present.len() as f64
}

fn distinct_present_values(values: &[ExtractedValue]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for value in values {
        let Some(text) = value.present_value() else {
            continue;
        };
        let norm = normalize(text);
        if !seen.contains(&norm) {
            seen.push(norm);
            out.push(text.to_string());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
