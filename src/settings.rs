use crate::index::IndexBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_GROUP: &str = "other";
/// Cut-off applied to groups without explicit configuration.
pub const DEFAULT_GROUP_LIMIT: usize = 5;

fn default_true() -> bool {
    true
}

fn default_min_fuzzy_chars() -> usize {
    3
}

fn default_prefetch_limit_factor() -> usize {
    1
}

fn default_max_sharpened_queries() -> usize {
    12
}

fn default_group_name() -> String {
    DEFAULT_GROUP.to_string()
}

/// How primary and secondary matches are interleaved before grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortStrategy {
    /// Primary and secondary matches merged by weight.
    #[default]
    PrimaryAndSecondaryByWeight,
    /// Match kinds kept apart in pipeline order.
    MatchGroupsSeparated,
}

/// Limits for one group. `limit` is used in cut-off mode, `share` (fraction
/// of the requested result count) in relative share mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    pub group_name: String,
    #[serde(default)]
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<f64>,
}

impl GroupConfig {
    pub fn with_limit(name: impl Into<String>, limit: usize) -> Self {
        GroupConfig {
            group_name: name.into(),
            limit,
            share: None,
        }
    }

    pub fn with_share(name: impl Into<String>, share: f64) -> Self {
        GroupConfig {
            group_name: name.into(),
            limit: 0,
            share: Some(share),
        }
    }
}

/// Effective per-tenant suggest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuggestConfig {
    /// BCP 47 tag used for case folding; empty means root.
    pub locale: String,

    #[serde(default = "default_true")]
    pub fuzzy_enabled: bool,

    /// Run the fuzzy step whenever results are short, not only when the
    /// prefix steps found nothing.
    pub always_do_fuzzy: bool,

    /// Terms must be longer than this to trigger the fuzzy step.
    #[serde(default = "default_min_fuzzy_chars")]
    pub min_fuzzy_chars: usize,

    pub sort_strategy: SortStrategy,

    /// Merge all providers' data into one index instead of one index per provider.
    pub use_data_source_merger: bool,

    /// Tag prefix carrying the group of a record, e.g. `"type"` for `"type:brand"`.
    pub group_key: Option<String>,

    /// Groups in dedup priority order; `None` disables cross-group dedup.
    pub group_deduplication_order: Option<Vec<String>>,

    pub use_relative_share_limit: bool,

    /// Over-fetch multiplier applied before grouping.
    #[serde(default = "default_prefetch_limit_factor")]
    pub prefetch_limit_factor: usize,

    #[serde(default = "default_max_sharpened_queries")]
    pub max_sharpened_queries: usize,

    pub group_config: Vec<GroupConfig>,

    /// Group assigned to records without a group tag.
    #[serde(default = "default_group_name")]
    pub default_group: String,

    pub index_backend: IndexBackend,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        SuggestConfig {
            locale: String::new(),
            fuzzy_enabled: true,
            always_do_fuzzy: false,
            min_fuzzy_chars: default_min_fuzzy_chars(),
            sort_strategy: SortStrategy::default(),
            use_data_source_merger: false,
            group_key: None,
            group_deduplication_order: None,
            use_relative_share_limit: false,
            prefetch_limit_factor: default_prefetch_limit_factor(),
            max_sharpened_queries: default_max_sharpened_queries(),
            group_config: Vec::new(),
            default_group: default_group_name(),
            index_backend: IndexBackend::default(),
        }
    }
}

impl SuggestConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SuggestConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Grouping (and thus over-fetching) only happens when groups are declared.
    pub fn grouping_enabled(&self) -> bool {
        self.group_key.is_some() || !self.group_config.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.group_config.iter().find(|g| g.group_name == name)
    }

    /// Cut-off for groups that are not configured: the default group's
    /// limit when present, else [`DEFAULT_GROUP_LIMIT`].
    pub fn default_group_limit(&self) -> usize {
        self.group(&self.default_group)
            .map(|g| g.limit)
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_GROUP_LIMIT)
    }

    /// Applies a `"name=0.4,other=0.3"` share property. Malformed entries are
    /// skipped with a warning.
    pub fn apply_share_conf(&mut self, conf: &str) {
        for (name, value) in parse_group_conf(conf) {
            match value.parse::<f64>() {
                Ok(share) if (0.0..=1.0).contains(&share) => {
                    self.group_entry(&name).share = Some(share);
                }
                _ => tracing::warn!(
                    "[CONFIG] ignoring share '{}' for group '{}': expected a fraction in 0..=1",
                    value,
                    name
                ),
            }
        }
    }

    /// Applies a `"name=5,other=3"` cut-off property. Malformed entries are
    /// skipped with a warning.
    pub fn apply_cutoff_conf(&mut self, conf: &str) {
        for (name, value) in parse_group_conf(conf) {
            match value.parse::<usize>() {
                Ok(limit) => self.group_entry(&name).limit = limit,
                Err(_) => tracing::warn!(
                    "[CONFIG] ignoring cut-off '{}' for group '{}': expected a count",
                    value,
                    name
                ),
            }
        }
    }

    fn group_entry(&mut self, name: &str) -> &mut GroupConfig {
        let pos = match self.group_config.iter().position(|g| g.group_name == name) {
            Some(pos) => pos,
            None => {
                self.group_config.push(GroupConfig::with_limit(name, 0));
                self.group_config.len() - 1
            }
        };
        &mut self.group_config[pos]
    }
}

fn parse_group_conf(conf: &str) -> Vec<(String, String)> {
    conf.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Some((name.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                tracing::warn!("[CONFIG] ignoring malformed group entry '{}'", entry);
                None
            }
        })
        .collect()
}
