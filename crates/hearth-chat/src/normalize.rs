//! Text normalization and approximate string similarity.
//!
//! Every comparison the engine makes between user text and catalog text goes
//! through [`normalize`], so "Jardim Glória", "jardim gloria" and
//! "JARDIM GLORIA" are the same neighborhood.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase and strip diacritics (NFD decomposition, combining marks removed).
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Scores how alike two already-normalized strings are.
pub trait SimilarityScorer: Send + Sync {
    /// Returns a value in `[0.0, 1.0]`; 1.0 means identical.
    fn score(&self, a: &str, b: &str) -> f64;
}

/// `1 - edit_distance / max_len`, counted in chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl SimilarityScorer for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

/// Two-row dynamic programming edit distance.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
