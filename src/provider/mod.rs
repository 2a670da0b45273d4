//! Contracts the engine consumes: where records come from and how a tenant
//! is configured. The manager polls providers, they never push.

pub mod config;
pub mod json_lines;
pub mod memory;
pub mod merging;

use crate::error::Result;
use crate::types::SuggestRecord;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub use config::{
    CompoundConfigProvider, DefaultConfigProvider, EnvConfigProvider, FileConfigProvider,
    StaticConfigProvider, SuggestConfigProvider,
};
pub use json_lines::JsonLinesDataProvider;
pub use memory::InMemoryDataProvider;
pub use merging::MergingDataProvider;

/// Modification time reported when a provider has nothing for a tenant.
pub const NO_MODIFICATION_TIME: i64 = -1;

/// A fallible, single-pass record stream. An `Err` item aborts the build
/// consuming it.
pub type RecordStream = Box<dyn Iterator<Item = Result<SuggestRecord>> + Send>;

/// One load of a tenant's suggest data.
pub struct SuggestData {
    /// Kind of data (e.g. "brand", "query-log"); added as a tag when several
    /// providers are merged.
    pub data_type: String,
    pub locale: String,
    /// Milliseconds since the epoch, or [`NO_MODIFICATION_TIME`].
    pub modification_time: i64,
    pub records: RecordStream,
    pub sharpened_queries: HashMap<String, Vec<String>>,
    pub relaxed_queries: HashMap<String, Vec<String>>,
    /// Dropped from multi-word queries, except for the last word.
    pub words_to_ignore: HashSet<String>,
}

impl SuggestData {
    pub fn from_stream(data_type: impl Into<String>, records: RecordStream) -> Self {
        SuggestData {
            data_type: data_type.into(),
            locale: String::new(),
            modification_time: NO_MODIFICATION_TIME,
            records,
            sharpened_queries: HashMap::new(),
            relaxed_queries: HashMap::new(),
            words_to_ignore: HashSet::new(),
        }
    }

    pub fn from_records(data_type: impl Into<String>, records: Vec<SuggestRecord>) -> Self {
        Self::from_stream(data_type, Box::new(records.into_iter().map(Ok)))
    }

    pub fn with_modification_time(mut self, time: i64) -> Self {
        self.modification_time = time;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

impl fmt::Debug for SuggestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestData")
            .field("data_type", &self.data_type)
            .field("locale", &self.locale)
            .field("modification_time", &self.modification_time)
            .field("sharpened_queries", &self.sharpened_queries.len())
            .field("relaxed_queries", &self.relaxed_queries.len())
            .field("words_to_ignore", &self.words_to_ignore.len())
            .finish_non_exhaustive()
    }
}

/// Source of suggest records for many tenants.
pub trait SuggestDataProvider: Send + Sync {
    /// Short name used in logs and stats.
    fn name(&self) -> &str;

    fn has_data(&self, tenant: &str) -> bool;

    /// Last modification time of the tenant's data in epoch milliseconds, or
    /// [`NO_MODIFICATION_TIME`] when there is none.
    fn last_modification_time(&self, tenant: &str) -> Result<i64>;

    fn load_data(&self, tenant: &str) -> Result<SuggestData>;
}
