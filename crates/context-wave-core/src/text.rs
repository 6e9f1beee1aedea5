//! Text processing helpers: tokenization, Jaccard overlap, capitalized-token
//! extraction.
//!
//! Dedup and MMR both use tokens of length >= 3, case-folded, with
//! punctuation stripped. No stemming.

use std::collections::BTreeSet;

/// Minimum token length kept by [`tokens`] and [`fold_token`].
pub const MIN_TOKEN_LEN: usize = 3;

/// Strip leading/trailing punctuation from a raw word.
fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Tokenize text for overlap comparison: case-folded, punctuation stripped,
/// tokens shorter than [`MIN_TOKEN_LEN`] dropped.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(trim_word)
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Fold a single token (for example a node name) into comparison form.
/// Returns `None` for tokens shorter than [`MIN_TOKEN_LEN`] after stripping.
pub fn fold_token(token: &str) -> Option<String> {
    let trimmed = trim_word(token);
    if trimmed.chars().count() >= MIN_TOKEN_LEN {
        Some(trimmed.to_lowercase())
    } else {
        None
    }
}

/// Jaccard overlap of two token sets: `|a ∩ b| / |a ∪ b|`.
///
/// Two empty sets have overlap 0.0 (nothing shared means nothing duplicated).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// The combined token set of a context's rule and description, used by the
/// semantic-dedup invariant.
pub fn dedup_tokens(rule: Option<&str>, description: &str) -> BTreeSet<String> {
    let mut set = tokens(description);
    if let Some(rule) = rule {
        set.extend(tokens(rule));
    }
    set
}

/// Extract capitalized single-word tokens from free text, case-preserving,
/// deduplicated in stable first-occurrence order.
///
/// Single-letter words ("I", "A") are skipped.
pub fn capitalized_words(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for raw in text.split_whitespace() {
        let word = trim_word(raw);
        if word.chars().count() < 2 {
            continue;
        }
        let starts_upper = word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        if starts_upper && seen.insert(word.to_string()) {
            out.push(word.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_fold_and_filter() {
        let set = tokens("When Egor criticizes the code, engage it.");
        assert!(set.contains("egor"));
        assert!(set.contains("criticizes"));
        assert!(set.contains("code"));
        // "it" is below the length floor even before punctuation stripping
        assert!(!set.contains("it"));
    }

    #[test]
    fn test_fold_token() {
        assert_eq!(fold_token("Egor"), Some("egor".to_string()));
        assert_eq!(fold_token("(code)"), Some("code".to_string()));
        assert_eq!(fold_token("ok"), None);
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        let a = tokens("engage with the substance");
        let b = tokens("engage with the substance");
        assert!((jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);

        let c = tokens("completely unrelated words");
        assert_eq!(jaccard(&a, &c), 0.0);
    }

    #[test]
    fn test_jaccard_empty_sets() {
        let empty = BTreeSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
        let a = tokens("some tokens here");
        assert_eq!(jaccard(&a, &empty), 0.0);
    }

    #[test]
    fn test_jaccard_near_duplicate_rules() {
        // The two rule phrasings the dedup invariant must catch.
        let a = dedup_tokens(
            Some("When Egor criticizes code, engage with the substance."),
            "",
        );
        let b = dedup_tokens(
            Some("When Egor criticizes the code, engage the substance."),
            "",
        );
        assert!(
            jaccard(&a, &b) > 0.6,
            "near-duplicate rules must exceed the dedup threshold, got {}",
            jaccard(&a, &b)
        );
    }

    #[test]
    fn test_capitalized_words_stable_order() {
        let words = capitalized_words("Egor sent Kai a message; Egor was brief. I agreed.");
        assert_eq!(words, vec!["Egor".to_string(), "Kai".to_string()]);
    }

    #[test]
    fn test_capitalized_words_strips_punctuation() {
        let words = capitalized_words("(Telegram) works.");
        assert_eq!(words, vec!["Telegram".to_string()]);
    }
}
