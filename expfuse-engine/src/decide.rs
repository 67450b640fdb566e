// Field Fusion Decision Procedure - Per-Field State Resolution
//
// Resolution ladder: all-null → exact agreement → fuzzy agreement →
// weighted voting → conflict. Shared by the symmetric matching policy and
// the record orchestrator; neither carries its own copy of the algorithm.
//
// Absent candidates never contribute weight or confidence.

use std::cmp::Ordering;

use expfuse_common::{Error, FusionCoefficients, Result};
use tracing::{debug, warn};

use crate::similarity::{normalize, similarity};
use crate::types::{Confidence, FieldCandidate, FieldFusionResult, FusionDecision};

/// Resolve one field from its candidate values.
///
/// # Arguments
/// * `field_name` - Schema field being fused
/// * `candidates` - One entry per contributing source (absent values allowed)
/// * `coefficients` - Process-wide fusion thresholds
///
/// # Returns
/// * `FieldFusionResult` with the authoritative value, calibrated confidence,
///   and the per-field review flag
pub fn decide(
    field_name: &str,
    candidates: &[FieldCandidate],
    coefficients: &FusionCoefficients,
) -> Result<FieldFusionResult> {
    if field_name.trim().is_empty() {
        return Err(Error::Validation("field name must not be blank".into()));
    }
    if candidates.is_empty() {
        return Err(Error::Validation(format!(
            "field '{field_name}': candidate list is empty"
        )));
    }

    let present: Vec<&FieldCandidate> = candidates
        .iter()
        .filter(|c| c.present_value().is_some())
        .collect();

    if present.is_empty() {
        return Ok(FieldFusionResult {
            field_name: field_name.to_string(),
            decision: FusionDecision::AllSourcesNull,
            value: None,
            confidence: 0.0,
            requires_manual_review: false,
        });
    }

    let groups = group_by_normalized(&present);

    // Exact agreement (a single present candidate trivially agrees with itself)
    if groups.len() == 1 {
        let confidence = mean_reliability(&present);
        let value = groups[0].representative().and_then(|c| c.value.clone());
        debug!(field = field_name, confidence, "all sources agree");
        return Ok(FieldFusionResult {
            field_name: field_name.to_string(),
            decision: FusionDecision::AllAgree,
            value,
            confidence,
            requires_manual_review: false,
        });
    }

    // Fuzzy agreement: every pairwise similarity among distinct values must
    // clear the threshold; the recorded similarity is the worst pair.
    if let Some(min_similarity) = minimum_pairwise_similarity(&groups) {
        if min_similarity >= coefficients.fuzzy_match_threshold {
            let leader = highest_reliability(&present);
            let confidence =
                (mean_reliability(&present) * min_similarity).clamp(0.0, 1.0);
            debug!(
                field = field_name,
                similarity = min_similarity,
                confidence,
                "fuzzy agreement"
            );
            return Ok(FieldFusionResult {
                field_name: field_name.to_string(),
                decision: FusionDecision::FuzzyAgreement {
                    similarity: min_similarity,
                },
                value: leader.and_then(|c| c.value.clone()),
                confidence,
                requires_manual_review: false,
            });
        }
    }

    weighted_vote(field_name, &groups, coefficients)
}

// ---------------------------------------------------------------------------
// Weighted voting
// ---------------------------------------------------------------------------

fn weighted_vote(
    field_name: &str,
    groups: &[ValueGroup<'_>],
    coefficients: &FusionCoefficients,
) -> Result<FieldFusionResult> {
    let total_weight: f64 = groups.iter().map(ValueGroup::weight).sum();

    // Rank distinct values: weight, then single highest reliability, then
    // declared source priority, then stable value order.
    let mut ranked: Vec<&ValueGroup<'_>> = groups.iter().collect();
    ranked.sort_by(|a, b| {
        float_desc(a.weight(), b.weight())
            .then_with(|| float_desc(a.top_reliability(), b.top_reliability()))
            .then_with(|| a.priority_rank(coefficients).cmp(&b.priority_rank(coefficients)))
            .then_with(|| a.normalized.cmp(&b.normalized))
    });

    let top = ranked[0];
    let runner_up = ranked[1];
    let confidence = if total_weight > 0.0 {
        (top.weight() / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let representative = top.representative();
    let value = representative.and_then(|c| c.value.clone());

    if top.weight() - runner_up.weight() >= coefficients.weight_margin {
        let winning_source = representative
            .map(|c| c.source_id.clone())
            .unwrap_or_default();
        debug!(
            field = field_name,
            winner = %winning_source,
            confidence,
            "weighted voting resolved"
        );
        Ok(FieldFusionResult {
            field_name: field_name.to_string(),
            decision: FusionDecision::WeightedVoting { winning_source },
            value,
            confidence,
            requires_manual_review: false,
        })
    } else {
        warn!(
            field = field_name,
            values = groups.len(),
            "unresolved conflict, manual review required"
        );
        Ok(FieldFusionResult {
            field_name: field_name.to_string(),
            decision: FusionDecision::Conflict,
            // Display-only leader, not an authoritative resolution
            value,
            confidence,
            requires_manual_review: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Value grouping
// ---------------------------------------------------------------------------

/// Candidates sharing one normalized value.
struct ValueGroup<'a> {
    normalized: String,
    members: Vec<&'a FieldCandidate>,
}

impl<'a> ValueGroup<'a> {
    /// Vote weight: sum of member reliabilities.
    fn weight(&self) -> f64 {
        self.members.iter().map(|c| c.reliability).sum()
    }

    fn top_reliability(&self) -> f64 {
        self.members
            .iter()
            .map(|c| c.reliability)
            .fold(0.0, f64::max)
    }

    /// Best priority rank among members (lower wins).
    fn priority_rank(&self, coefficients: &FusionCoefficients) -> usize {
        self.members
            .iter()
            .map(|c| coefficients.priority_rank(&c.source_id))
            .min()
            .unwrap_or(usize::MAX)
    }

    /// The literal text carried forward for this value: the
    /// highest-reliability holder's, first-seen on ties.
    fn representative(&self) -> Option<&'a FieldCandidate> {
        self.members.iter().copied().max_by(|a, b| {
            a.reliability
                .partial_cmp(&b.reliability)
                .unwrap_or(Ordering::Equal) // Treat NaN as equal
        })
    }
}

fn group_by_normalized<'a>(present: &[&'a FieldCandidate]) -> Vec<ValueGroup<'a>> {
    let mut groups: Vec<ValueGroup<'a>> = Vec::new();
    for candidate in present {
        let Some(text) = candidate.present_value() else {
            continue;
        };
        let normalized = normalize(text);
        match groups.iter_mut().find(|g| g.normalized == normalized) {
            Some(group) => group.members.push(candidate),
            None => groups.push(ValueGroup {
                normalized,
                members: vec![candidate],
            }),
        }
    }
    groups
}

/// Minimum pairwise similarity across distinct values; `None` for fewer than
/// two groups.
fn minimum_pairwise_similarity(groups: &[ValueGroup<'_>]) -> Option<f64> {
    if groups.len() < 2 {
        return None;
    }
    let mut min = 1.0f64;
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            min = min.min(similarity(&groups[i].normalized, &groups[j].normalized));
        }
    }
    Some(min)
}

fn mean_reliability(present: &[&FieldCandidate]) -> Confidence {
    if present.is_empty() {
        return 0.0;
    }
    let sum: f64 = present.iter().map(|c| c.reliability).sum();
    (sum / present.len() as f64).clamp(0.0, 1.0)
}

fn highest_reliability<'a>(present: &[&'a FieldCandidate]) -> Option<&'a FieldCandidate> {
    present.iter().copied().max_by(|a, b| {
        a.reliability
            .partial_cmp(&b.reliability)
            .unwrap_or(Ordering::Equal) // Treat NaN as equal
    })
}

fn float_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
