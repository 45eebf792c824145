//! Content identity fingerprints binding speculative assets to final items.

use std::collections::HashSet;

/// Build the normalized fingerprint for an item's visual identity.
///
/// Lowercase, strip punctuation, keep content words longer than 3 chars,
/// take the first 4, sort, join. The result is stable under wording changes
/// that keep the same content words.
pub fn content_fingerprint(title: &str, purpose: &str, asset_kind: &str) -> String {
    let joined = format!("{title} {purpose} {asset_kind}").to_lowercase();
    let cleaned: String = joined
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .take(4)
        .collect();
    words.sort_unstable();
    words.join(" ")
}

/// Word overlap between two fingerprints, relative to the larger word set.
pub fn fingerprint_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    let larger = set_a.len().max(set_b.len());
    if larger == 0 {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    shared as f64 / larger as f64
}

/// Whether a speculative asset still matches the item it was generated for.
pub fn fingerprints_match(original: &str, current: &str) -> bool {
    fingerprint_overlap(original, current) >= 0.5
}
