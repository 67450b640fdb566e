// Text Similarity Primitive - Normalized Near-Equivalence Scoring
//
// Pure and deterministic. Both fusion entry points compare candidate values
// through this module, so normalization rules live here and nowhere else.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a value for comparison: case-fold, strip diacritics, collapse
/// internal whitespace, trim.
pub fn normalize(input: &str) -> String {
    let stripped: String = input.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity between two values: `1 - edit_distance / max(len, 1)` over the
/// normalized forms. Two empty strings yield 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if norm_a.is_empty() && norm_b.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(&norm_a, &norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_values_score_one() {
        assert_eq!(similarity("A/AS1-1111-222222-AAA", "A/AS1-1111-222222-AAA"), 1.0);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let ab = similarity("Juzgado Octavo", "Juzgado Noveno");
        let ba = similarity("Juzgado Noveno", "Juzgado Octavo");
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_accents_are_stripped() {
        assert_eq!(similarity("Juzgado Décimo", "Juzgado Decimo"), 1.0);
    }

    #[test]
    fn test_case_and_whitespace_normalized() {
        assert_eq!(similarity("  SECRETARÍA   DE HACIENDA ", "secretaria de hacienda"), 1.0);
    }

    #[test]
    fn test_both_empty_score_one() {
        assert_eq!(similarity("", "   "), 1.0);
    }

    #[test]
    fn test_ocr_confusion_scores_high() {
        // 0/O and 1/l substitutions, the typical scanned-PDF noise
        let score = similarity("Juzgado Octavo de Distrito", "Juzgad0 Octavo de Distr1to");
        assert!(score > 0.9, "expected > 0.9, got {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn test_unrelated_values_score_low() {
        assert!(similarity("aseguramiento", "desbloqueo") < 0.5);
    }

    #[test]
    fn test_score_in_unit_range() {
        for (a, b) in [("", "x"), ("abc", "xyz"), ("a", "aaaa")] {
            let s = similarity(a, b);
            assert!((0.0..=1.0).contains(&s), "similarity({a}, {b}) = {s}");
        }
    }
}
