//! # Flapjack Suggest
//!
//! Multi-tenant autocomplete. Each tenant's weighted phrases are indexed in
//! memory for prefix lookup with a typo-tolerant fuzzy fallback, results are
//! deduplicated and grouped under per-group limits, and a
//! [`SuggestManager`] keeps every active tenant fresh by polling its data
//! providers and swapping rebuilt snapshots in without blocking queries.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use flapjack_suggest::{InMemoryDataProvider, SuggestManager, SuggestRecord};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # fn main() -> flapjack_suggest::Result<()> {
//! let products = Arc::new(InMemoryDataProvider::new("products"));
//! products.put(
//!     "shop",
//!     vec![
//!         SuggestRecord::new("wireless headphones", 120).with_tag("audio"),
//!         SuggestRecord::new("wireless charger", 80),
//!     ],
//! );
//!
//! let manager = SuggestManager::builder().data_provider(products).build()?;
//! let hits = manager.suggest("shop", "wirless", &HashMap::new(), 5)?;
//! assert_eq!(hits.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Single-tenant use with [`Suggester`]
//!
//! ```rust,no_run
//! use flapjack_suggest::{build_suggester, SuggestConfig, SuggestData, SuggestRecord, TagFilter};
//!
//! # fn main() -> flapjack_suggest::Result<()> {
//! let data = SuggestData::from_records("cities", vec![SuggestRecord::new("Berlin", 10)]);
//! let suggester = build_suggester("demo", vec![data], SuggestConfig::default())?;
//! let hits = suggester.query("ber", &TagFilter::default(), 5)?;
//! assert_eq!(hits[0].phrase, "Berlin");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod manager;
pub mod metrics;
pub mod provider;
pub mod query;
pub mod settings;
pub mod tokenizer;
pub mod types;

pub use error::{Result, SuggestError};
pub use index::{FuzzyPrefixIndex, IndexBackend, Lookup};
pub use manager::{
    ManagerSettings, RefreshOutcome, SuggestManager, SuggestManagerBuilder, TenantStats,
    TenantStatus,
};
pub use metrics::{CountingMetrics, MetricsSink, NoopMetrics};
pub use provider::{
    CompoundConfigProvider, DefaultConfigProvider, EnvConfigProvider, FileConfigProvider,
    InMemoryDataProvider, JsonLinesDataProvider, MergingDataProvider, StaticConfigProvider,
    SuggestConfigProvider, SuggestData, SuggestDataProvider,
};
pub use query::suggester::{build_suggester, Suggester};
pub use settings::{GroupConfig, SortStrategy, SuggestConfig};
pub use types::*;
