//! Typo-tolerant band lookup, used for "did you mean" suggestions.

use std::cmp::Ordering;

/// Case-insensitive Damerau-Levenshtein distance (adjacent transpositions
/// cost one edit).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Two rows back are needed for transpositions.
    let mut before: Vec<usize> = vec![0; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                curr[j] = curr[j].min(before[j - 2] + 1);
            }
        }
        std::mem::swap(&mut before, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// 1.0 for identical strings, falling towards 0.0 with edit distance.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// Edits tolerated for a query of this length: none up to three
/// characters, one up to six, two beyond.
pub fn auto_max_distance(query: &str) -> usize {
    match query.chars().count() {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    }
}

/// Candidates matching `query` as `(candidate, distance, similarity)`,
/// closest first. A substring hit counts as distance 0; a query close to
/// any single word of a multi-word name also matches ("Gojra" finds
/// "Gojira", "Ocean" finds "The Ocean Collective").
pub fn fuzzy_search<'a>(
    query: &str,
    candidates: &'a [String],
    max_distance: Option<usize>,
) -> Vec<(&'a str, usize, f64)> {
    let max_dist = max_distance.unwrap_or_else(|| auto_max_distance(query));
    let query = query.to_lowercase();

    let mut results: Vec<(&str, usize, f64)> = candidates
        .iter()
        .filter_map(|c| {
            let lower = c.to_lowercase();
            if lower.contains(&query) {
                return Some((c.as_str(), 0, similarity(&query, &lower)));
            }
            let dist = levenshtein(&query, &lower);
            if dist <= max_dist {
                return Some((c.as_str(), dist, similarity(&query, &lower)));
            }
            lower
                .split_whitespace()
                .map(|w| (levenshtein(&query, w), w))
                .filter(|(d, _)| *d <= max_dist)
                .min_by_key(|(d, _)| *d)
                .map(|(d, w)| (c.as_str(), d, similarity(&query, w)))
        })
        .collect();

    results.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then(b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
            .then_with(|| a.0.cmp(b.0))
    });
    results
}
