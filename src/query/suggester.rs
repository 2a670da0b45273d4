//! Per-tenant query engine: index lookups, dedup, grouping.

use crate::error::{Result, SuggestError};
use crate::index::{FuzzyPrefixIndex, Hit, Lookup, ModifiedTerms};
use crate::provider::SuggestData;
use crate::query::limiter::{dedup_across_groups, GroupLimiter};
use crate::settings::{SortStrategy, SuggestConfig};
use crate::tokenizer::normalize;
use crate::types::{MatchKind, SuggestRecord, Suggestion, TagFilter};
use std::collections::HashSet;

/// One indexed data source of a tenant.
pub struct SuggestSource {
    name: String,
    index: FuzzyPrefixIndex,
    modified: ModifiedTerms,
    words_to_ignore: HashSet<String>,
}

impl SuggestSource {
    pub fn new(name: impl Into<String>, index: FuzzyPrefixIndex) -> Self {
        SuggestSource {
            name: name.into(),
            index,
            modified: ModifiedTerms::default(),
            words_to_ignore: HashSet::new(),
        }
    }

    /// Builds the index for one provider load. The config locale wins over
    /// the locale shipped with the data.
    pub fn from_data(data: SuggestData, config: &SuggestConfig) -> Result<Self> {
        let locale = if config.locale.is_empty() {
            data.locale.as_str()
        } else {
            config.locale.as_str()
        };
        let index = FuzzyPrefixIndex::build(config.index_backend, locale, data.records)?;
        let modified = ModifiedTerms::new(locale, data.sharpened_queries, data.relaxed_queries);
        let words_to_ignore = data
            .words_to_ignore
            .iter()
            .map(|w| normalize(locale, w))
            .filter(|w| !w.is_empty())
            .collect();
        Ok(SuggestSource {
            name: data.data_type,
            index,
            modified,
            words_to_ignore,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Removes ignored words from a multi-word term, keeping the last word.
    fn strip_ignored(&self, term: &str) -> String {
        if self.words_to_ignore.is_empty() {
            return term.to_string();
        }
        let words: Vec<&str> = term.split(' ').collect();
        let Some((last, init)) = words.split_last() else {
            return term.to_string();
        };
        let kept: Vec<&str> = init
            .iter()
            .copied()
            .filter(|w| !self.words_to_ignore.contains(*w))
            .chain(std::iter::once(*last))
            .collect();
        kept.join(" ")
    }
}

/// Candidates gathered for one query, deduplicated by payload and group.
struct Candidates<'a> {
    config: &'a SuggestConfig,
    seen: HashSet<(String, String)>,
    list: Vec<Suggestion>,
}

impl<'a> Candidates<'a> {
    fn new(config: &'a SuggestConfig) -> Self {
        Candidates {
            config,
            seen: HashSet::new(),
            list: Vec::new(),
        }
    }

    fn group_of(&self, record: &SuggestRecord) -> String {
        let config = self.config;
        let tagged = match &config.group_key {
            Some(key) => {
                let prefix = format!("{}:", key);
                record
                    .tags
                    .iter()
                    .find_map(|t| t.strip_prefix(prefix.as_str()))
                    .map(str::to_string)
            }
            None => record.tags.iter().find(|t| config.group(t).is_some()).cloned(),
        };
        tagged.unwrap_or_else(|| config.default_group.clone())
    }

    fn push(&mut self, suggestion: Suggestion) -> bool {
        let key = (suggestion.payload.clone(), suggestion.group.clone());
        if self.seen.insert(key) {
            self.list.push(suggestion);
            true
        } else {
            false
        }
    }

    fn push_hits(&mut self, hits: Vec<Hit>, kind: MatchKind) {
        for hit in hits {
            let kind = match kind {
                MatchKind::Fuzzy1 | MatchKind::Fuzzy2 if hit.distance > 1 => MatchKind::Fuzzy2,
                MatchKind::Fuzzy1 | MatchKind::Fuzzy2 => MatchKind::Fuzzy1,
                other => other,
            };
            let suggestion = Suggestion {
                phrase: hit.record.primary_text.clone(),
                group: self.group_of(&hit.record),
                payload: hit.record.payload().to_string(),
                weight: hit.record.weight,
                kind,
            };
            self.push(suggestion);
        }
    }

    fn push_phrases(&mut self, phrases: &[String], kind: MatchKind) {
        for phrase in phrases {
            let suggestion = Suggestion {
                phrase: phrase.clone(),
                group: self.config.default_group.clone(),
                payload: phrase.clone(),
                weight: 0,
                kind,
            };
            self.push(suggestion);
        }
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}

/// Query engine over one snapshot of a tenant's data.
pub struct Suggester {
    sources: Vec<SuggestSource>,
    config: SuggestConfig,
    limiter: GroupLimiter,
}

impl Suggester {
    pub fn new(sources: Vec<SuggestSource>, config: SuggestConfig) -> Self {
        let limiter = GroupLimiter::from_config(&config);
        Suggester {
            sources,
            config,
            limiter,
        }
    }

    pub fn config(&self) -> &SuggestConfig {
        &self.config
    }

    pub fn record_count(&self) -> usize {
        self.sources.iter().map(SuggestSource::record_count).sum()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(SuggestSource::name).collect()
    }

    /// Ranked suggestions for `term`. A blank term or a zero limit yields an
    /// empty list.
    pub fn query(&self, term: &str, filter: &TagFilter, limit: usize) -> Result<Vec<Suggestion>> {
        let term = normalize(&self.config.locale, term);
        if term.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = if self.config.grouping_enabled() {
            limit.saturating_mul(self.config.prefetch_limit_factor.max(1))
        } else {
            limit
        };

        let mut candidates = Candidates::new(&self.config);
        for source in &self.sources {
            self.collect(source, &term, filter, fetch, limit, &mut candidates)?;
        }
        let mut list = candidates.list;

        if let Some(order) = &self.config.group_deduplication_order {
            list = dedup_across_groups(list, order, &self.config.locale);
        }
        if self.config.grouping_enabled() {
            list = self.limiter.limit(list, limit);
        } else {
            list.truncate(limit);
        }
        Ok(list)
    }

    fn collect(
        &self,
        source: &SuggestSource,
        term: &str,
        filter: &TagFilter,
        fetch: usize,
        limit: usize,
        out: &mut Candidates<'_>,
    ) -> Result<()> {
        let config = &self.config;
        let start = out.len();
        let lookup_term = source.strip_ignored(term);

        out.push_phrases(
            source.modified.sharpened(term, config.max_sharpened_queries),
            MatchKind::Sharpened,
        );

        let ranked_from = out.len();
        let hits = source.index.lookup_prefix(&lookup_term, filter, fetch)?;
        out.push_hits(hits, MatchKind::Primary);

        if out.len() - start < fetch {
            let hits = source.index.lookup_secondary(&lookup_term, filter, fetch)?;
            out.push_hits(hits, MatchKind::Secondary);
        }
        if config.sort_strategy == SortStrategy::PrimaryAndSecondaryByWeight {
            out.list[ranked_from..].sort_by(|a, b| b.weight.cmp(&a.weight));
        }

        let found = out.len() - start;
        let fuzzy_allowed = config.fuzzy_enabled
            && lookup_term.chars().count() > config.min_fuzzy_chars
            && found < fetch
            && (config.always_do_fuzzy || found == 0)
            && filter.is_empty();
        if fuzzy_allowed {
            let hits = source.index.lookup_fuzzy(&lookup_term, filter, fetch - found)?;
            out.push_hits(hits, MatchKind::Fuzzy1);
        }

        let found = out.len() - start;
        if found < fetch && (config.always_do_fuzzy || found == 0) && filter.is_empty() {
            let hits = source.index.lookup_shingle(&lookup_term, filter, fetch - found)?;
            out.push_hits(hits, MatchKind::Shingle);
        }

        if out.len() - start < limit {
            out.push_phrases(source.modified.relaxed(term), MatchKind::Relaxed);
        }
        Ok(())
    }
}

/// Builds a suggester for `tenant` from provider loads, one source per load.
pub fn build_suggester(
    tenant: &str,
    loads: Vec<SuggestData>,
    config: SuggestConfig,
) -> Result<Suggester> {
    if loads.is_empty() {
        return Err(SuggestError::NoData(tenant.to_string()));
    }
    let sources = loads
        .into_iter()
        .map(|data| SuggestSource::from_data(data, &config).map_err(|e| e.into_build(tenant)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Suggester::new(sources, config))
}
