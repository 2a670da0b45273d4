use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use crate::types::TagFilter;

/// Largest distance the Levenshtein automaton supports.
pub const MAX_AUTOMATON_DISTANCE: u32 = 2;

/// Builds a fuzzy prefix query over a raw (untokenized) field: it matches
/// terms that have some prefix within `distance` edits of `term`.
pub struct FuzzyPrefixQueryBuilder {
    field: Field,
    term: String,
    distance: u8,
}

impl FuzzyPrefixQueryBuilder {
    pub fn new(field: Field, term: &str, distance: u32) -> Self {
        FuzzyPrefixQueryBuilder {
            field,
            term: term.to_string(),
            distance: distance.min(MAX_AUTOMATON_DISTANCE) as u8,
        }
    }

    pub fn distance(&self) -> u32 {
        self.distance as u32
    }

    pub fn build(self) -> Box<dyn Query> {
        Box::new(FuzzyTermQuery::new_prefix(
            Term::from_field_text(self.field, &self.term),
            self.distance,
            true,
        ))
    }
}

/// Exact term match on a field indexed without positions.
pub fn term_query(field: Field, text: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, text),
        IndexRecordOption::Basic,
    ))
}

/// Restricts `base` to documents carrying any tag of `filter` in `tag_field`.
pub fn with_tag_filter(
    base: Box<dyn Query>,
    tag_field: Field,
    filter: &TagFilter,
) -> Box<dyn Query> {
    if filter.is_empty() {
        return base;
    }
    let any_tag: Vec<(Occur, Box<dyn Query>)> = filter
        .tags()
        .map(|t| (Occur::Should, term_query(tag_field, t)))
        .collect();
    Box::new(BooleanQuery::new(vec![
        (Occur::Must, base),
        (Occur::Must, Box::new(BooleanQuery::new(any_tag)) as Box<dyn Query>),
    ]))
}
