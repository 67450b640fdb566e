//! Fusion configuration: coefficients, matching-policy options, TOML loading
//!
//! Configuration is loaded once at startup and treated as immutable for the
//! process lifetime. Reconfiguration publishes a fresh snapshot (a new `Arc`
//! handed to new invocations), never in-place mutation, so concurrent readers
//! need no synchronization.
//!
//! Out-of-range values never terminate processing: they are clamped into
//! `[0,1]` with a recorded warning. A missing config file degrades to the
//! compiled defaults, also with a warning.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_FUZZY_MATCH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_AUTO_PROCESS_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MANUAL_REVIEW_THRESHOLD: f64 = 0.70;
pub const DEFAULT_WEIGHT_MARGIN: f64 = 0.25;
pub const DEFAULT_CONFLICT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MINIMUM_CONFIDENCE: f64 = 0.3;

/// Canonical tie-break order for the asymmetric record path: on an exact
/// weight tie the structured feed wins (it transcribes rather than
/// interpreting pixels), then word-processor OCR, then scanned OCR.
pub const CANONICAL_SOURCE_PRIORITY: [&str; 3] =
    ["structured_feed", "document_ocr", "scanned_ocr"];

// ---------------------------------------------------------------------------
// Fusion coefficients (asymmetric / decision-procedure thresholds)
// ---------------------------------------------------------------------------

/// Process-wide thresholds for the field fusion decision procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionCoefficients {
    /// Minimum pairwise similarity for fuzzy agreement
    pub fuzzy_match_threshold: f64,
    /// Record-level confidence at or above which auto-processing is allowed
    pub auto_process_threshold: f64,
    /// Record-level confidence below which manual review is mandatory
    pub manual_review_threshold: f64,
    /// Weight advantage the top value needs to win a contested vote
    pub weight_margin: f64,
    /// Declared source priority for exact tie-breaks, strongest first
    pub source_priority: Vec<String>,
}

impl Default for FusionCoefficients {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: DEFAULT_FUZZY_MATCH_THRESHOLD,
            auto_process_threshold: DEFAULT_AUTO_PROCESS_THRESHOLD,
            manual_review_threshold: DEFAULT_MANUAL_REVIEW_THRESHOLD,
            weight_margin: DEFAULT_WEIGHT_MARGIN,
            source_priority: CANONICAL_SOURCE_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FusionCoefficients {
    /// Parse from TOML and clamp out-of-range values.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let parsed: FusionCoefficients =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        Ok(parsed.sanitized())
    }

    /// Load from an optional TOML file. `None` or a missing file yields the
    /// compiled defaults (with a warning for the missing file); an unreadable
    /// or malformed file is a configuration error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            warn!(path = %path.display(), "coefficients file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Clamp every threshold into `[0,1]`, warning on each adjustment.
    pub fn sanitized(mut self) -> Self {
        self.fuzzy_match_threshold = clamp_unit("fuzzy_match_threshold", self.fuzzy_match_threshold);
        self.auto_process_threshold = clamp_unit("auto_process_threshold", self.auto_process_threshold);
        self.manual_review_threshold = clamp_unit("manual_review_threshold", self.manual_review_threshold);
        self.weight_margin = clamp_unit("weight_margin", self.weight_margin);
        self
    }

    /// Rank of a source in the declared priority order (lower wins).
    /// Undeclared sources rank last.
    pub fn priority_rank(&self, source_id: &str) -> usize {
        self.source_priority
            .iter()
            .position(|s| s == source_id)
            .unwrap_or(usize::MAX)
    }
}

// ---------------------------------------------------------------------------
// Matching policy options (symmetric path)
// ---------------------------------------------------------------------------

/// Options for the symmetric field matching policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingPolicyOptions {
    /// Weight advantage required to resolve disagreeing candidates
    pub conflict_threshold: f64,
    /// Candidates below this confidence are treated as absent
    pub minimum_confidence: f64,
    /// Tie-break order on exact weight ties, strongest first
    pub source_priority: Vec<String>,
    /// Per-field partial overrides, merged over the globals at lookup time
    pub per_field_overrides: HashMap<String, FieldPolicyOverride>,
}

impl Default for MatchingPolicyOptions {
    fn default() -> Self {
        Self {
            conflict_threshold: DEFAULT_CONFLICT_THRESHOLD,
            minimum_confidence: DEFAULT_MINIMUM_CONFIDENCE,
            source_priority: Vec::new(),
            per_field_overrides: HashMap::new(),
        }
    }
}

/// Partial per-field override; unset fields inherit the global value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPolicyOverride {
    pub conflict_threshold: Option<f64>,
    pub minimum_confidence: Option<f64>,
    pub source_priority: Option<Vec<String>>,
}

/// Fully-resolved policy for one field.
#[derive(Debug, Clone)]
pub struct EffectiveFieldPolicy {
    pub conflict_threshold: f64,
    pub minimum_confidence: f64,
    pub source_priority: Vec<String>,
}

impl MatchingPolicyOptions {
    /// Parse from TOML and clamp out-of-range values.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let parsed: MatchingPolicyOptions =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        Ok(parsed.sanitized())
    }

    /// Clamp global and per-field thresholds into `[0,1]`.
    pub fn sanitized(mut self) -> Self {
        self.conflict_threshold = clamp_unit("conflict_threshold", self.conflict_threshold);
        self.minimum_confidence = clamp_unit("minimum_confidence", self.minimum_confidence);
        for (field, over) in &mut self.per_field_overrides {
            if let Some(v) = over.conflict_threshold {
                over.conflict_threshold = Some(clamp_unit(&format!("{field}.conflict_threshold"), v));
            }
            if let Some(v) = over.minimum_confidence {
                over.minimum_confidence = Some(clamp_unit(&format!("{field}.minimum_confidence"), v));
            }
        }
        self
    }

    /// Resolve the effective policy for one field: global defaults with the
    /// field's partial override merged on top.
    pub fn for_field(&self, field_name: &str) -> EffectiveFieldPolicy {
        let over = self.per_field_overrides.get(field_name);
        EffectiveFieldPolicy {
            conflict_threshold: over
                .and_then(|o| o.conflict_threshold)
                .unwrap_or(self.conflict_threshold),
            minimum_confidence: over
                .and_then(|o| o.minimum_confidence)
                .unwrap_or(self.minimum_confidence),
            source_priority: over
                .and_then(|o| o.source_priority.clone())
                .unwrap_or_else(|| self.source_priority.clone()),
        }
    }
}

/// Clamp a configuration value into `[0,1]`, recording a warning when it was
/// out of range. NaN collapses to 0.0.
pub fn clamp_unit(name: &str, value: f64) -> f64 {
    if value.is_nan() {
        warn!(name, "configuration value is NaN, clamped to 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        let clamped = value.clamp(0.0, 1.0);
        warn!(name, value, clamped, "configuration value out of range, clamped");
        return clamped;
    }
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficient_defaults() {
        let c = FusionCoefficients::default();
        assert_eq!(c.fuzzy_match_threshold, 0.85);
        assert_eq!(c.auto_process_threshold, 0.85);
        assert_eq!(c.manual_review_threshold, 0.70);
        assert_eq!(c.weight_margin, 0.25);
        assert_eq!(c.source_priority.len(), 3);
        assert_eq!(c.source_priority[0], "structured_feed");
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults() {
        let c = FusionCoefficients::from_toml_str("manual_review_threshold = 0.6").unwrap();
        assert_eq!(c.manual_review_threshold, 0.6);
        assert_eq!(c.fuzzy_match_threshold, 0.85);
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let c = FusionCoefficients::from_toml_str(
            "fuzzy_match_threshold = 1.5\nweight_margin = -0.2",
        )
        .unwrap();
        assert_eq!(c.fuzzy_match_threshold, 1.0);
        assert_eq!(c.weight_margin, 0.0);
    }

    #[test]
    fn test_nan_clamps_to_zero() {
        assert_eq!(clamp_unit("x", f64::NAN), 0.0);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = FusionCoefficients::from_toml_str("fuzzy_match_threshold = \"high\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_priority_rank() {
        let c = FusionCoefficients::default();
        assert_eq!(c.priority_rank("structured_feed"), 0);
        assert_eq!(c.priority_rank("scanned_ocr"), 2);
        assert_eq!(c.priority_rank("unknown"), usize::MAX);
    }

    #[test]
    fn test_per_field_override_merges_over_globals() {
        let toml = r#"
conflict_threshold = 0.5
minimum_confidence = 0.3
source_priority = ["a", "b"]

[per_field_overrides.rfc]
minimum_confidence = 0.6
"#;
        let options = MatchingPolicyOptions::from_toml_str(toml).unwrap();

        let rfc = options.for_field("rfc");
        assert_eq!(rfc.minimum_confidence, 0.6);
        assert_eq!(rfc.conflict_threshold, 0.5);
        assert_eq!(rfc.source_priority, vec!["a".to_string(), "b".to_string()]);

        let other = options.for_field("autoridad");
        assert_eq!(other.minimum_confidence, 0.3);
    }

    #[test]
    fn test_override_priority_replaces_globals() {
        let mut options = MatchingPolicyOptions::default();
        options.source_priority = vec!["a".into(), "b".into()];
        options.per_field_overrides.insert(
            "monto".into(),
            FieldPolicyOverride {
                source_priority: Some(vec!["b".into()]),
                ..Default::default()
            },
        );
        assert_eq!(options.for_field("monto").source_priority, vec!["b".to_string()]);
    }
}
