//! Search-library backend: one in-RAM tantivy index per snapshot.
//!
//! Prefixes are answered by exact term lookups against fields indexed with
//! [`PrefixGramFilter`]; fuzzy lookups use a prefix Levenshtein automaton over
//! the raw primary key. Documents only carry an ordinal fast field, ranking is
//! done against the shared record table so results match the trie backend.

use super::{fuzzy_token_fits, max_edits, Hit, IndexedRecord, Lookup, RecordTable};
use crate::error::Result;
use crate::query::fuzzy::{term_query, with_tag_filter, FuzzyPrefixQueryBuilder};
use crate::query::similarity::prefix_edit_distance;
use crate::tokenizer::PrefixGramFilter;
use crate::types::TagFilter;
use tantivy::collector::DocSetCollector;
use tantivy::columnar::Column;
use tantivy::query::Query;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STRING,
};
use tantivy::tokenizer::{RawTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument};

const PREFIX_TOKENIZER: &str = "suggest_prefix";
/// Longest indexed prefix gram, in characters. Longer tokens are looked up by
/// their leading gram and verified against the record table.
const MAX_PREFIX_GRAM: usize = 48;
const WRITER_HEAP_BYTES: usize = 32 * 1024 * 1024;

struct SuggestFields {
    ordinal: Field,
    primary_prefix: Field,
    secondary_prefix: Field,
    shingle_prefix: Field,
    primary_exact: Field,
    tags: Field,
}

fn build_schema() -> (Schema, SuggestFields) {
    let mut builder = Schema::builder();
    let prefix_options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(PREFIX_TOKENIZER)
            .set_index_option(IndexRecordOption::Basic),
    );
    let fields = SuggestFields {
        ordinal: builder.add_u64_field("ordinal", FAST),
        primary_prefix: builder.add_text_field("primary_prefix", prefix_options.clone()),
        secondary_prefix: builder.add_text_field("secondary_prefix", prefix_options.clone()),
        shingle_prefix: builder.add_text_field("shingle_prefix", prefix_options),
        primary_exact: builder.add_text_field("primary_exact", STRING),
        tags: builder.add_text_field("tags", STRING),
    };
    (builder.build(), fields)
}

pub struct TantivyIndex {
    table: RecordTable,
    fields: SuggestFields,
    reader: IndexReader,
}

impl TantivyIndex {
    pub(crate) fn new(table: RecordTable) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        index.tokenizers().register(
            PREFIX_TOKENIZER,
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(PrefixGramFilter::new(MAX_PREFIX_GRAM))
                .build(),
        );

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for (ordinal, entry) in table.entries.iter().enumerate() {
            let mut doc = TantivyDocument::default();
            doc.add_u64(fields.ordinal, ordinal as u64);
            doc.add_text(fields.primary_prefix, &entry.primary_key);
            doc.add_text(fields.primary_exact, &entry.primary_key);
            if let Some(key) = &entry.secondary_key {
                doc.add_text(fields.secondary_prefix, key);
            }
            for key in &entry.shingle_keys {
                doc.add_text(fields.shingle_prefix, key);
            }
            for tag in &entry.record.tags {
                doc.add_text(fields.tags, tag);
            }
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        tracing::debug!(records = table.entries.len(), "[INDEX] tantivy snapshot built");
        Ok(TantivyIndex {
            table,
            fields,
            reader,
        })
    }

    /// Runs `query` and returns the ordinals of all matching documents.
    fn ordinals(&self, searcher: &Searcher, query: &dyn Query) -> Result<Vec<u32>> {
        let columns = searcher
            .segment_readers()
            .iter()
            .map(|segment| segment.fast_fields().u64("ordinal"))
            .collect::<tantivy::Result<Vec<Column<u64>>>>()?;
        let addresses = searcher.search(query, &DocSetCollector)?;
        Ok(addresses
            .into_iter()
            .filter_map(|addr| columns[addr.segment_ord as usize].first(addr.doc_id))
            .map(|o| o as u32)
            .collect())
    }

    /// `has_prefix` confirms a match when `token` is longer than the indexed
    /// grams.
    fn prefix_in(
        &self,
        field: Field,
        token: &str,
        filter: &TagFilter,
        limit: usize,
        has_prefix: impl Fn(&IndexedRecord, &str) -> bool,
    ) -> Result<Vec<Hit>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        let gram: String = token.chars().take(MAX_PREFIX_GRAM).collect();
        let query = with_tag_filter(term_query(field, &gram), self.fields.tags, filter);
        let mut ordinals = self.ordinals(&self.reader.searcher(), query.as_ref())?;
        if gram.len() < token.len() {
            ordinals.retain(|o| has_prefix(&self.table.entries[*o as usize], token));
        }
        Ok(self.table.rank_prefix(ordinals, limit))
    }
}

impl Lookup for TantivyIndex {
    fn lookup_prefix(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.prefix_in(self.fields.primary_prefix, token, filter, limit, |e, t| {
            e.primary_key.starts_with(t)
        })
    }

    fn lookup_secondary(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.prefix_in(self.fields.secondary_prefix, token, filter, limit, |e, t| {
            e.secondary_key.as_deref().is_some_and(|k| k.starts_with(t))
        })
    }

    fn lookup_fuzzy(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        if !fuzzy_token_fits(token) {
            return Ok(Vec::new());
        }
        let builder =
            FuzzyPrefixQueryBuilder::new(self.fields.primary_exact, token, max_edits(token));
        let max = builder.distance() as usize;
        let query = with_tag_filter(builder.build(), self.fields.tags, filter);
        let found = self
            .ordinals(&self.reader.searcher(), query.as_ref())?
            .into_iter()
            .filter_map(|o| {
                let key = &self.table.entries[o as usize].primary_key;
                let distance = prefix_edit_distance(token, key);
                (distance <= max).then_some((o, distance as u32))
            })
            .collect();
        Ok(self.table.rank_fuzzy(token, found, limit))
    }

    fn lookup_shingle(&self, token: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Hit>> {
        self.prefix_in(self.fields.shingle_prefix, token, filter, limit, |e, t| {
            e.shingle_keys.iter().any(|k| k.starts_with(t))
        })
    }

    fn len(&self) -> usize {
        self.table.entries.len()
    }
}
