//! Character-overlap scoring and edit-distance helpers used by fuzzy matching.

use crate::tokenizer::case_fold;
use std::collections::HashMap;

/// Share of alphabetic characters two strings have in common, in `[0, 1]`.
///
/// Both inputs are trimmed and case-folded for `locale` first. Equal inputs
/// score 1.0, an empty input scores 0.0. Otherwise the multiset intersection of
/// alphabetic characters is divided by the larger alphabetic count, which makes
/// the score symmetric.
pub fn common_chars(locale: &str, input: &str, target: &str) -> f64 {
    let a = case_fold(locale, input.trim());
    let b = case_fold(locale, target.trim());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut a_len = 0usize;
    for c in a.chars().filter(|c| c.is_alphabetic()) {
        *counts.entry(c).or_insert(0) += 1;
        a_len += 1;
    }

    let mut b_len = 0usize;
    let mut shared = 0usize;
    for c in b.chars().filter(|c| c.is_alphabetic()) {
        b_len += 1;
        if let Some(n) = counts.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                shared += 1;
            }
        }
    }

    let longest = a_len.max(b_len);
    if longest == 0 {
        return 0.0;
    }
    shared as f64 / longest as f64
}

/// Maximum edit distance tolerated for a token of `len` characters:
/// `round(ln(len))`. Length 20 gives 3, lengths 2..=4 give 1.
pub fn fuzzy_threshold(len: usize) -> u32 {
    if len == 0 {
        return 0;
    }
    (len as f64).ln().round() as u32
}

/// Optimal string alignment distance (Levenshtein plus adjacent transpositions).
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::osa_distance(a, b)
}

/// Smallest OSA distance between `token` and any prefix of `text`.
pub fn prefix_edit_distance(token: &str, text: &str) -> usize {
    let token: Vec<char> = token.chars().collect();
    let mut prev2: Vec<usize> = Vec::new();
    let mut prev: Vec<usize> = (0..=token.len()).collect();
    let mut best = prev[token.len()];
    let mut prev_char: Option<char> = None;
    let mut row = vec![0; token.len() + 1];

    for ch in text.chars() {
        osa_step(&token, &prev2, &prev, prev_char, ch, &mut row);
        best = best.min(row[token.len()]);
        if best == 0 {
            break;
        }
        prev2 = std::mem::replace(&mut prev, row.clone());
        prev_char = Some(ch);
    }
    best
}

/// Computes the next OSA row after appending `ch` to the candidate text.
///
/// `prev` is the row for the text without `ch`, `prev2` the one before it
/// (empty at depth one) and `prev_char` the character that produced `prev`.
/// `row[j]` is the distance between `token[..j]` and the extended text.
pub(crate) fn osa_step(
    token: &[char],
    prev2: &[usize],
    prev: &[usize],
    prev_char: Option<char>,
    ch: char,
    row: &mut [usize],
) {
    row[0] = prev[0] + 1;
    for j in 1..=token.len() {
        let cost = usize::from(token[j - 1] != ch);
        let mut d = (row[j - 1] + 1).min(prev[j] + 1).min(prev[j - 1] + cost);
        if j > 1 && !prev2.is_empty() && prev_char == Some(token[j - 1]) && token[j - 2] == ch {
            d = d.min(prev2[j - 2] + 1);
        }
        row[j] = d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_chars_equal_after_trim_and_case() {
        assert_eq!(common_chars("", "Foo", " foo"), 1.0);
    }

    #[test]
    fn test_common_chars_disjoint() {
        assert_eq!(common_chars("", "foo", "bar"), 0.0);
    }

    #[test]
    fn test_common_chars_empty_input() {
        assert_eq!(common_chars("", "", "bar"), 0.0);
        assert_eq!(common_chars("", "foo", "   "), 0.0);
    }

    #[test]
    fn test_common_chars_is_symmetric() {
        let ab = common_chars("", "shoes", "hose");
        let ba = common_chars("", "hose", "shoes");
        assert_eq!(ab, ba);
        assert!((ab - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_common_chars_ignores_non_alphabetic() {
        assert_eq!(common_chars("", "a-1", "a 2"), 1.0);
        assert_eq!(common_chars("", "123", "456"), 0.0);
    }

    #[test]
    fn test_fuzzy_threshold_values() {
        assert_eq!(fuzzy_threshold(0), 0);
        assert_eq!(fuzzy_threshold(1), 0);
        assert_eq!(fuzzy_threshold(3), 1);
        assert_eq!(fuzzy_threshold(4), 1);
        assert_eq!(fuzzy_threshold(5), 2);
        assert_eq!(fuzzy_threshold(12), 2);
        assert_eq!(fuzzy_threshold(20), 3);
    }

    #[test]
    fn test_edit_distance_counts_transposition_once() {
        assert_eq!(edit_distance("abcd", "abdc"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_prefix_edit_distance() {
        assert_eq!(prefix_edit_distance("appel", "apple pie"), 1);
        assert_eq!(prefix_edit_distance("aple", "apple"), 1);
        assert_eq!(prefix_edit_distance("app", "apple"), 0);
        assert_eq!(prefix_edit_distance("xyz", "apple"), 3);
        assert_eq!(prefix_edit_distance("", "apple"), 0);
    }
}
