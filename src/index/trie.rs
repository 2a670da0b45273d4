//! Arena-allocated character trie.
//!
//! Nodes live in one `Vec` and refer to each other by index. Each node keeps
//! its children sorted by character and the ordinals of the keys ending there.

use super::{fuzzy_token_fits, max_edits, Hit, Lookup, RecordTable};
use crate::error::Result;
use crate::query::similarity::osa_step;
use crate::types::TagFilter;

#[derive(Default)]
struct Node {
    children: Vec<(char, u32)>,
    terminals: Vec<u32>,
}

pub(crate) struct CharTrie {
    nodes: Vec<Node>,
}

impl CharTrie {
    fn new() -> Self {
        CharTrie {
            nodes: vec![Node::default()],
        }
    }

    fn insert(&mut self, key: &str, ordinal: u32) {
        let mut node = 0usize;
        for ch in key.chars() {
            let next = match self.nodes[node]
                .children
                .binary_search_by_key(&ch, |(c, _)| *c)
            {
                Ok(pos) => self.nodes[node].children[pos].1,
                Err(pos) => {
                    let id = self.nodes.len() as u32;
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(pos, (ch, id));
                    id
                }
            };
            node = next as usize;
        }
        self.nodes[node].terminals.push(ordinal);
    }

    fn find(&self, prefix: &str) -> Option<u32> {
        let mut node = 0u32;
        for ch in prefix.chars() {
            let children = &self.nodes[node as usize].children;
            let pos = children.binary_search_by_key(&ch, |(c, _)| *c).ok()?;
            node = children[pos].1;
        }
        Some(node)
    }

    fn collect_subtree(&self, root: u32, out: &mut Vec<u32>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            out.extend_from_slice(&node.terminals);
            stack.extend(node.children.iter().map(|(_, child)| *child));
        }
    }

    /// Collects `(ordinal, distance)` for every key that has a prefix within
    /// `max` OSA edits of `token`. The distance reported is the smallest over
    /// all prefixes of the key.
    fn fuzzy_prefix(&self, token: &[char], max: usize) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        let first: Vec<usize> = (0..=token.len()).collect();
        let best = token.len();
        let mut walk = FuzzyWalk {
            trie: self,
            token,
            max,
            out: &mut out,
        };
        walk.descend(0, &[], &first, None, best);
        out
    }
}

struct FuzzyWalk<'a> {
    trie: &'a CharTrie,
    token: &'a [char],
    max: usize,
    out: &'a mut Vec<(u32, u32)>,
}

impl FuzzyWalk<'_> {
    fn emit_subtree(&mut self, node: u32, distance: usize) {
        let mut ordinals = Vec::new();
        self.trie.collect_subtree(node, &mut ordinals);
        self.out.extend(ordinals.into_iter().map(|o| (o, distance as u32)));
    }

    fn descend(
        &mut self,
        node: u32,
        prev2: &[usize],
        prev: &[usize],
        prev_char: Option<char>,
        best: usize,
    ) {
        let trie = self.trie;
        let token = self.token;
        let n = token.len();
        let prev_min = prev.iter().copied().min().unwrap_or(0);
        let mut row = vec![0usize; n + 1];

        for &(ch, child) in &trie.nodes[node as usize].children {
            osa_step(token, prev2, prev, prev_char, ch, &mut row);
            let best_here = best.min(row[n]);
            let row_min = row.iter().copied().min().unwrap_or(0);
            // No key below `child` can score under this bound.
            let floor = row_min.min(prev_min + 1);

            if best_here <= self.max && floor >= best_here {
                self.emit_subtree(child, best_here);
                continue;
            }
            if best_here <= self.max {
                let terminals = &trie.nodes[child as usize].terminals;
                self.out
                    .extend(terminals.iter().map(|o| (*o, best_here as u32)));
            }
            if floor > self.max {
                continue;
            }
            let next = row.clone();
            self.descend(child, prev, &next, Some(ch), best_here);
        }
    }
}

/// Trie-backed index: separate tries for primary, secondary and shingle keys
/// over a shared record table.
pub struct TrieIndex {
    table: RecordTable,
    primary: CharTrie,
    secondary: CharTrie,
    shingles: CharTrie,
}

impl TrieIndex {
    pub(crate) fn new(table: RecordTable) -> Self {
        let mut primary = CharTrie::new();
        let mut secondary = CharTrie::new();
        let mut shingles = CharTrie::new();
        for (ordinal, entry) in table.entries.iter().enumerate() {
            primary.insert(&entry.primary_key, ordinal as u32);
            if let Some(key) = &entry.secondary_key {
                secondary.insert(key, ordinal as u32);
            }
            for key in &entry.shingle_keys {
                shingles.insert(key, ordinal as u32);
            }
        }
        tracing::debug!(
            records = table.entries.len(),
            primary_nodes = primary.nodes.len(),
            secondary_nodes = secondary.nodes.len(),
            shingle_nodes = shingles.nodes.len(),
            "[INDEX] trie built"
        );
        TrieIndex {
            table,
            primary,
            secondary,
            shingles,
        }
    }

    fn prefix_in(
        &self,
        trie: &CharTrie,
        token: &str,
        filter: &TagFilter,
        limit: usize,
    ) -> Vec<Hit> {
        let Some(node) = trie.find(token) else {
            return Vec::new();
        };
        let mut ordinals = Vec::new();
        trie.collect_subtree(node, &mut ordinals);
        ordinals.retain(|o| self.table.passes(*o, filter));
        self.table.rank_prefix(ordinals, limit)
    }
}

impl Lookup for TrieIndex {
    fn lookup_prefix(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        Ok(self.prefix_in(&self.primary, token, filter, limit))
    }

    fn lookup_secondary(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        Ok(self.prefix_in(&self.secondary, token, filter, limit))
    }

    fn lookup_fuzzy(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        if !fuzzy_token_fits(token) {
            return Ok(Vec::new());
        }
        let chars: Vec<char> = token.chars().collect();
        let mut found = self.primary.fuzzy_prefix(&chars, max_edits(token) as usize);
        found.retain(|(o, _)| self.table.passes(*o, filter));
        Ok(self.table.rank_fuzzy(token, found, limit))
    }

    fn lookup_shingle(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        Ok(self.prefix_in(&self.shingles, token, filter, limit))
    }

    fn len(&self) -> usize {
        self.table.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MAX_FUZZY_CHARS;
    use crate::types::SuggestRecord;

    fn index(texts: &[(&str, i64)]) -> TrieIndex {
        let records = texts
            .iter()
            .map(|(t, w)| Ok(SuggestRecord::new(*t, *w)))
            .collect::<Vec<_>>();
        TrieIndex::new(RecordTable::collect("", records).unwrap())
    }

    fn fuzzy(index: &TrieIndex, token: &str) -> Vec<(String, u32)> {
        index
            .lookup_fuzzy(token, &TagFilter::default(), 50)
            .unwrap()
            .into_iter()
            .map(|h| (h.record.primary_text.clone(), h.distance))
            .collect()
    }

    #[test]
    fn test_shared_prefix_nodes() {
        let idx = index(&[("car", 1), ("cart", 1), ("care", 1)]);
        // root + c,a,r + t + e
        assert_eq!(idx.primary.nodes.len(), 6);
    }

    #[test]
    fn test_every_key_with_prefix_is_found() {
        let idx = index(&[("car", 1), ("cart", 2), ("care", 3), ("cat", 4), ("dog", 5)]);
        let hits = idx.lookup_prefix("car", &TagFilter::default(), usize::MAX).unwrap();
        let mut got: Vec<&str> = hits.iter().map(|h| h.record.primary_text.as_str()).collect();
        got.sort();
        assert_eq!(got, vec!["car", "care", "cart"]);
    }

    #[test]
    fn test_duplicate_keys_keep_insertion_order() {
        let idx = index(&[("shoe", 3), ("shoe", 3), ("shoes", 3)]);
        let hits = idx.lookup_prefix("sho", &TagFilter::default(), 10).unwrap();
        let ordinals: Vec<u32> = hits.iter().map(|h| h.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_fuzzy_ignores_overlong_tokens() {
        let long = "x".repeat(MAX_FUZZY_CHARS + 20);
        let idx = index(&[(long.as_str(), 1)]);
        let fits: String = long.chars().take(MAX_FUZZY_CHARS).collect();
        assert_eq!(fuzzy(&idx, &fits).len(), 1);
        assert!(fuzzy(&idx, &long[..MAX_FUZZY_CHARS + 1]).is_empty());
    }

    #[test]
    fn test_fuzzy_reports_minimal_prefix_distance() {
        let idx = index(&[("apple pie", 1), ("maple", 1)]);
        let got = fuzzy(&idx, "apple");
        assert_eq!(got[0], ("apple pie".to_string(), 0));
        // no prefix of "maple" is closer than the whole word
        assert!(got.contains(&("maple".to_string(), 2)));
    }

    #[test]
    fn test_fuzzy_ranks_distance_before_weight() {
        let idx = index(&[("sneakers", 100), ("snekaers", 1), ("snakers", 50)]);
        let got = fuzzy(&idx, "sneakers");
        assert_eq!(got[0], ("sneakers".to_string(), 0));
        assert_eq!(got[1].1, 1);
        assert_eq!(got[2].1, 1);
        // equal distance falls back to weight
        assert_eq!(got[1].0, "snakers");
    }

    #[test]
    fn test_fuzzy_threshold_excludes_far_keys() {
        let idx = index(&[("zebra", 1)]);
        assert!(fuzzy(&idx, "apple").is_empty());
    }

    #[test]
    fn test_fuzzy_matches_dp_reference() {
        use crate::query::similarity::prefix_edit_distance;
        let words = [
            "shoe", "shoes", "short", "shirt", "hose", "sheet", "ahoy", "shampoo", "shore",
            "choose",
        ];
        let idx = index(&words.iter().map(|w| (*w, 1)).collect::<Vec<_>>());
        for token in ["shoo", "shrot", "sheo", "hsoe", "chose"] {
            let max = max_edits(token) as usize;
            let mut expected: Vec<(String, u32)> = words
                .iter()
                .filter_map(|w| {
                    let d = prefix_edit_distance(token, w);
                    (d <= max).then(|| (w.to_string(), d as u32))
                })
                .collect();
            let mut got = fuzzy(&idx, token);
            expected.sort();
            got.sort();
            assert_eq!(got, expected, "token {}", token);
        }
    }
}
