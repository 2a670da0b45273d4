use crate::settings::SuggestConfig;
use crate::types::TenantId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves the configuration of a tenant. Returning `None` lets the next
/// provider in a [`CompoundConfigProvider`] answer.
pub trait SuggestConfigProvider: Send + Sync {
    fn get_config(&self, tenant: &str) -> Option<SuggestConfig>;

    /// Lower values are asked first.
    fn priority(&self) -> i32 {
        0
    }
}

/// Answers every tenant with the same configuration.
pub struct DefaultConfigProvider {
    config: SuggestConfig,
}

impl DefaultConfigProvider {
    pub fn new(config: SuggestConfig) -> Self {
        DefaultConfigProvider { config }
    }
}

impl SuggestConfigProvider for DefaultConfigProvider {
    fn get_config(&self, _tenant: &str) -> Option<SuggestConfig> {
        Some(self.config.clone())
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }
}

/// Fixed per-tenant configurations.
#[derive(Default)]
pub struct StaticConfigProvider {
    configs: HashMap<TenantId, SuggestConfig>,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>, config: SuggestConfig) -> Self {
        self.configs.insert(tenant.into(), config);
        self
    }
}

impl SuggestConfigProvider for StaticConfigProvider {
    fn get_config(&self, tenant: &str) -> Option<SuggestConfig> {
        self.configs.get(tenant).cloned()
    }
}

/// Reads `<dir>/<tenant>.json`. Unreadable or malformed files are logged and
/// skipped so the next provider (ultimately the default) applies.
pub struct FileConfigProvider {
    dir: PathBuf,
}

impl FileConfigProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        FileConfigProvider {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl SuggestConfigProvider for FileConfigProvider {
    fn get_config(&self, tenant: &str) -> Option<SuggestConfig> {
        if tenant.contains(['/', '\\']) || tenant.starts_with('.') {
            return None;
        }
        let path = self.dir.join(format!("{}.json", tenant));
        if !path.is_file() {
            return None;
        }
        match SuggestConfig::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("[CONFIG {}] ignoring {}: {}", tenant, path.display(), e);
                None
            }
        }
    }
}

/// Asks providers in priority order and falls back to a process-wide default.
pub struct CompoundConfigProvider {
    providers: Vec<Arc<dyn SuggestConfigProvider>>,
    default: SuggestConfig,
}

impl CompoundConfigProvider {
    pub fn new(
        mut providers: Vec<Arc<dyn SuggestConfigProvider>>,
        default: SuggestConfig,
    ) -> Self {
        providers.sort_by_key(|p| p.priority());
        CompoundConfigProvider { providers, default }
    }

    pub fn default_config(&self) -> &SuggestConfig {
        &self.default
    }

    pub fn resolve(&self, tenant: &str) -> SuggestConfig {
        self.get_config(tenant)
            .unwrap_or_else(|| self.default.clone())
    }
}

impl SuggestConfigProvider for CompoundConfigProvider {
    fn get_config(&self, tenant: &str) -> Option<SuggestConfig> {
        self.providers.iter().find_map(|p| p.get_config(tenant))
    }
}


/// Process-wide overrides from `FLAPJACK_SUGGEST_*` variables, read once at
/// construction and layered over a base config. Answers every tenant when at
/// least one variable is set, and no tenant otherwise.
pub struct EnvConfigProvider {
    config: Option<SuggestConfig>,
}

impl EnvConfigProvider {
    pub fn from_env(base: &SuggestConfig) -> Self {
        let mut config = base.clone();
        let mut touched = false;

        if let Ok(locale) = std::env::var("FLAPJACK_SUGGEST_LOCALE") {
            config.locale = locale.trim().to_string();
            touched = true;
        }
        if let Some(v) = env_flag("FLAPJACK_SUGGEST_FUZZY") {
            config.fuzzy_enabled = v;
            touched = true;
        }
        if let Some(v) = env_flag("FLAPJACK_SUGGEST_ALWAYS_FUZZY") {
            config.always_do_fuzzy = v;
            touched = true;
        }
        if let Some(v) = env_flag("FLAPJACK_SUGGEST_USE_MERGER") {
            config.use_data_source_merger = v;
            touched = true;
        }
        if let Ok(backend) = std::env::var("FLAPJACK_SUGGEST_INDEX_BACKEND") {
            match serde_json::from_value(serde_json::Value::String(backend.trim().to_lowercase())) {
                Ok(b) => {
                    config.index_backend = b;
                    touched = true;
                }
                Err(_) => tracing::warn!("[CONFIG] unknown index backend {:?}", backend),
            }
        }
        if let Ok(conf) = std::env::var("FLAPJACK_SUGGEST_SHARE_CONF") {
            config.apply_share_conf(&conf);
            touched = true;
        }
        if let Ok(conf) = std::env::var("FLAPJACK_SUGGEST_CUTOFF_CONF") {
            config.apply_cutoff_conf(&conf);
            touched = true;
        }

        EnvConfigProvider {
            config: touched.then_some(config),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("[CONFIG] ignoring {}={:?}: expected a boolean", name, raw);
            None
        }
    }
}

impl SuggestConfigProvider for EnvConfigProvider {
    fn get_config(&self, _tenant: &str) -> Option<SuggestConfig> {
        self.config.clone()
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Prioritized(i32, &'static str);

    impl SuggestConfigProvider for Prioritized {
        fn get_config(&self, _tenant: &str) -> Option<SuggestConfig> {
            Some(SuggestConfig {
                locale: self.1.to_string(),
                ..SuggestConfig::default()
            })
        }

        fn priority(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_compound_falls_back_to_default() {
        let mut tuned = SuggestConfig::default();
        tuned.always_do_fuzzy = true;
        let stat = StaticConfigProvider::new().with_tenant("shop", tuned.clone());
        let mut default = SuggestConfig::default();
        default.locale = "de".into();

        let compound = CompoundConfigProvider::new(
            vec![Arc::new(stat) as Arc<dyn SuggestConfigProvider>],
            default.clone(),
        );
        assert_eq!(compound.resolve("shop"), tuned);
        assert_eq!(compound.resolve("blog"), default);
    }

    #[test]
    fn test_compound_orders_by_priority() {
        let compound = CompoundConfigProvider::new(
            vec![
                Arc::new(Prioritized(5, "late")) as Arc<dyn SuggestConfigProvider>,
                Arc::new(Prioritized(1, "early")),
            ],
            SuggestConfig::default(),
        );
        assert_eq!(compound.resolve("any").locale, "early");
    }

    #[test]
    fn test_file_provider_skips_malformed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shop.json"), r#"{"alwaysDoFuzzy":true}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        let p = FileConfigProvider::new(dir.path());
        assert!(p.get_config("shop").unwrap().always_do_fuzzy);
        assert!(p.get_config("broken").is_none());
        assert!(p.get_config("missing").is_none());
        assert!(p.get_config("../shop").is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_env_provider_overrides_base() {
        const VARS: &[&str] = &[
            "FLAPJACK_SUGGEST_LOCALE",
            "FLAPJACK_SUGGEST_FUZZY",
            "FLAPJACK_SUGGEST_ALWAYS_FUZZY",
            "FLAPJACK_SUGGEST_USE_MERGER",
            "FLAPJACK_SUGGEST_INDEX_BACKEND",
            "FLAPJACK_SUGGEST_SHARE_CONF",
            "FLAPJACK_SUGGEST_CUTOFF_CONF",
        ];
        for v in VARS {
            std::env::remove_var(v);
        }
        assert!(EnvConfigProvider::from_env(&SuggestConfig::default())
            .get_config("shop")
            .is_none());

        std::env::set_var("FLAPJACK_SUGGEST_FUZZY", "off");
        std::env::set_var("FLAPJACK_SUGGEST_INDEX_BACKEND", "Tantivy");
        std::env::set_var("FLAPJACK_SUGGEST_CUTOFF_CONF", "brand=2");
        let config = EnvConfigProvider::from_env(&SuggestConfig::default())
            .get_config("shop")
            .unwrap();
        for v in VARS {
            std::env::remove_var(v);
        }
        assert!(!config.fuzzy_enabled);
        assert_eq!(config.index_backend, crate::index::IndexBackend::Tantivy);
        assert_eq!(config.group("brand").map(|g| g.limit), Some(2));
    }
}
