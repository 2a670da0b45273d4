//! In-memory prefix and fuzzy lookup over one tenant's records.
//!
//! An index is built once from a stream of records and is read-only
//! afterwards, so any number of queries can share it without locking. Two
//! backends implement the same [`Lookup`] contract: a custom arena trie and a
//! tantivy in-RAM index. Both return identical orderings.
//!
//! Besides primary and secondary keys every multi-word primary key is also
//! indexed with its words reordered ("shingle" keys), so `headphones wire`
//! finds `wireless headphones`.

pub mod modified;
pub mod tantivy_index;
pub mod trie;

use crate::error::Result;
use crate::query::similarity::{common_chars, fuzzy_threshold};
use crate::tokenizer::normalize;
use crate::types::{SuggestRecord, TagFilter};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

pub use modified::ModifiedTerms;
pub use tantivy_index::TantivyIndex;
pub use trie::TrieIndex;

/// Which backend a tenant's index is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Trie,
    Tantivy,
}

/// A record found by a lookup.
#[derive(Debug, Clone)]
pub struct Hit {
    pub record: Arc<SuggestRecord>,
    /// Insertion position, the final tie-break.
    pub ordinal: u32,
    /// Edit distance to the query token; 0 for prefix matches.
    pub distance: u32,
}

/// The lookup contract shared by all backends. Tokens are expected to be
/// normalized with the index locale already.
pub trait Lookup: Send + Sync {
    /// Records whose primary text starts with `token`, by weight descending.
    fn lookup_prefix(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>>;

    /// Records whose secondary text starts with `token`, by weight descending.
    fn lookup_secondary(&self, token: &str, filter: &TagFilter, limit: usize)
        -> Result<Vec<Hit>>;

    /// Records whose primary text has a prefix within `round(ln(len))` edits
    /// of `token`, by distance ascending then weight descending.
    fn lookup_fuzzy(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>>;

    /// Records with a word-reordered primary key starting with `token`, by
    /// weight descending.
    fn lookup_shingle(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) struct IndexedRecord {
    pub record: Arc<SuggestRecord>,
    pub primary_key: String,
    pub secondary_key: Option<String>,
    pub shingle_keys: Vec<String>,
}

/// Records of one build in insertion order, with their normalized keys.
/// The position in `entries` is the record ordinal.
pub(crate) struct RecordTable {
    pub locale: String,
    pub entries: Vec<IndexedRecord>,
}

impl RecordTable {
    /// Drains `records`, aborting on the first upstream error so a partial
    /// table is never returned.
    pub fn collect<I>(locale: &str, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<SuggestRecord>>,
    {
        let mut entries = Vec::new();
        for item in records {
            let mut record = item?;
            record.clamp_secondary();
            let primary_key = normalize(locale, &record.primary_text);
            if primary_key.is_empty() {
                tracing::debug!("[INDEX] skipping record with blank primary text");
                continue;
            }
            let secondary_key = record
                .secondary_text
                .as_deref()
                .map(|t| normalize(locale, t))
                .filter(|k| !k.is_empty());
            entries.push(IndexedRecord {
                record: Arc::new(record),
                shingle_keys: shingle_keys(&primary_key),
                primary_key,
                secondary_key,
            });
        }
        Ok(RecordTable {
            locale: locale.to_string(),
            entries,
        })
    }

    pub fn hit(&self, ordinal: u32, distance: u32) -> Hit {
        Hit {
            record: Arc::clone(&self.entries[ordinal as usize].record),
            ordinal,
            distance,
        }
    }

    pub fn passes(&self, ordinal: u32, filter: &TagFilter) -> bool {
        filter.matches(&self.entries[ordinal as usize].record)
    }

    /// Orders prefix candidates by weight descending, then ordinal, and
    /// truncates to `limit`.
    pub fn rank_prefix(&self, mut ordinals: Vec<u32>, limit: usize) -> Vec<Hit> {
        ordinals.sort_unstable_by(|a, b| {
            let wa = self.entries[*a as usize].record.weight;
            let wb = self.entries[*b as usize].record.weight;
            wb.cmp(&wa).then(a.cmp(b))
        });
        ordinals.dedup();
        ordinals.truncate(limit);
        ordinals.into_iter().map(|o| self.hit(o, 0)).collect()
    }

    /// Orders fuzzy candidates by distance, weight descending, character
    /// overlap with the token, then ordinal, and truncates to `limit`.
    pub fn rank_fuzzy(&self, token: &str, mut found: Vec<(u32, u32)>, limit: usize) -> Vec<Hit> {
        let overlap = |ordinal: u32| {
            common_chars(
                &self.locale,
                token,
                &self.entries[ordinal as usize].primary_key,
            )
        };
        found.sort_by(|(oa, da), (ob, db)| {
            let wa = self.entries[*oa as usize].record.weight;
            let wb = self.entries[*ob as usize].record.weight;
            da.cmp(db)
                .then(wb.cmp(&wa))
                .then_with(|| {
                    overlap(*ob)
                        .partial_cmp(&overlap(*oa))
                        .unwrap_or(Ordering::Equal)
                })
                .then(oa.cmp(ob))
        });
        found.dedup_by_key(|(o, _)| *o);
        found.truncate(limit);
        found.into_iter().map(|(o, d)| self.hit(o, d)).collect()
    }
}

/// Keys with up to this many words get every word order indexed, longer
/// keys only their rotations.
const MAX_PERMUTED_WORDS: usize = 4;

/// Word reorderings of a normalized primary key, without the key itself.
pub(crate) fn shingle_keys(key: &str) -> Vec<String> {
    let words: Vec<&str> = key.split(' ').collect();
    if words.len() < 2 {
        return Vec::new();
    }
    let mut orders: Vec<Vec<&str>> = Vec::new();
    if words.len() <= MAX_PERMUTED_WORDS {
        permute(&mut words.clone(), 0, &mut orders);
    } else {
        for start in 1..words.len() {
            let mut rotated = words.clone();
            rotated.rotate_left(start);
            orders.push(rotated);
        }
    }
    let mut keys: Vec<String> = Vec::with_capacity(orders.len());
    for order in orders {
        let joined = order.join(" ");
        if joined != key && !keys.contains(&joined) {
            keys.push(joined);
        }
    }
    keys
}

fn permute<'a>(words: &mut [&'a str], k: usize, out: &mut Vec<Vec<&'a str>>) {
    if k == words.len() {
        out.push(words.to_vec());
        return;
    }
    for i in k..words.len() {
        words.swap(k, i);
        permute(words, k + 1, out);
        words.swap(k, i);
    }
}

/// Longest token, in characters, a fuzzy lookup accepts. Longer tokens get no
/// fuzzy hits.
pub const MAX_FUZZY_CHARS: usize = 48;

pub(crate) fn fuzzy_token_fits(token: &str) -> bool {
    !token.is_empty() && token.chars().nth(MAX_FUZZY_CHARS).is_none()
}

/// Maximum edits tolerated for `token` under the fuzzy threshold rule.
pub(crate) fn max_edits(token: &str) -> u32 {
    fuzzy_threshold(token.chars().count())
}

/// A built index for one tenant, dispatching to the selected backend.
pub enum FuzzyPrefixIndex {
    Trie(TrieIndex),
    Tantivy(TantivyIndex),
}

impl FuzzyPrefixIndex {
    /// Builds an index from `records`. The first `Err` item aborts the build.
    pub fn build<I>(backend: IndexBackend, locale: &str, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<SuggestRecord>>,
    {
        let table = RecordTable::collect(locale, records)?;
        Ok(match backend {
            IndexBackend::Trie => FuzzyPrefixIndex::Trie(TrieIndex::new(table)),
            IndexBackend::Tantivy => FuzzyPrefixIndex::Tantivy(TantivyIndex::new(table)?),
        })
    }

    pub fn from_records(
        backend: IndexBackend,
        locale: &str,
        records: Vec<SuggestRecord>,
    ) -> Result<Self> {
        Self::build(backend, locale, records.into_iter().map(Ok))
    }

    pub fn backend(&self) -> IndexBackend {
        match self {
            FuzzyPrefixIndex::Trie(_) => IndexBackend::Trie,
            FuzzyPrefixIndex::Tantivy(_) => IndexBackend::Tantivy,
        }
    }

    fn inner(&self) -> &dyn Lookup {
        match self {
            FuzzyPrefixIndex::Trie(i) => i,
            FuzzyPrefixIndex::Tantivy(i) => i,
        }
    }
}

impl Lookup for FuzzyPrefixIndex {
    fn lookup_prefix(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.inner().lookup_prefix(token, filter, limit)
    }

    fn lookup_secondary(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.inner().lookup_secondary(token, filter, limit)
    }

    fn lookup_fuzzy(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.inner().lookup_fuzzy(token, filter, limit)
    }

    fn lookup_shingle(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.inner().lookup_shingle(token, filter, limit)
    }

    fn len(&self) -> usize {
        self.inner().len()
    }
}
