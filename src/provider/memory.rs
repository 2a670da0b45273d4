use super::{SuggestData, SuggestDataProvider, NO_MODIFICATION_TIME};
use crate::error::{Result, SuggestError};
use crate::types::{SuggestRecord, TenantId};
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Clone)]
struct Entry {
    records: Vec<SuggestRecord>,
    modified: i64,
    locale: String,
    sharpened: HashMap<String, Vec<String>>,
    relaxed: HashMap<String, Vec<String>>,
}

/// Provider backed by a concurrent in-process map. Every `put` bumps the
/// tenant's modification time so the next poll picks it up.
pub struct InMemoryDataProvider {
    name: String,
    tenants: DashMap<TenantId, Entry>,
}

impl InMemoryDataProvider {
    pub fn new(name: impl Into<String>) -> Self {
        InMemoryDataProvider {
            name: name.into(),
            tenants: DashMap::new(),
        }
    }

    /// Stores `records`, stamped with the current time (strictly after the
    /// previous stamp for the tenant).
    pub fn put(&self, tenant: &str, records: Vec<SuggestRecord>) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self
            .tenants
            .get(tenant)
            .map(|e| e.modified)
            .unwrap_or(NO_MODIFICATION_TIME);
        let modified = now.max(previous + 1);
        self.put_at(tenant, records, modified);
        modified
    }

    pub fn put_at(&self, tenant: &str, records: Vec<SuggestRecord>, modified: i64) {
        let mut entry = self.tenants.entry(tenant.to_string()).or_insert_with(|| Entry {
            records: Vec::new(),
            modified,
            locale: String::new(),
            sharpened: HashMap::new(),
            relaxed: HashMap::new(),
        });
        entry.records = records;
        entry.modified = modified;
    }

    pub fn set_locale(&self, tenant: &str, locale: &str) {
        if let Some(mut e) = self.tenants.get_mut(tenant) {
            e.locale = locale.to_string();
        }
    }

    pub fn set_modified_terms(
        &self,
        tenant: &str,
        sharpened: HashMap<String, Vec<String>>,
        relaxed: HashMap<String, Vec<String>>,
    ) {
        if let Some(mut e) = self.tenants.get_mut(tenant) {
            e.sharpened = sharpened;
            e.relaxed = relaxed;
        }
    }

    pub fn remove(&self, tenant: &str) {
        self.tenants.remove(tenant);
    }
}

impl SuggestDataProvider for InMemoryDataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data(&self, tenant: &str) -> bool {
        self.tenants.contains_key(tenant)
    }

    fn last_modification_time(&self, tenant: &str) -> Result<i64> {
        Ok(self
            .tenants
            .get(tenant)
            .map(|e| e.modified)
            .unwrap_or(NO_MODIFICATION_TIME))
    }

    fn load_data(&self, tenant: &str) -> Result<SuggestData> {
        // clone out so no map shard lock is held while the caller builds
        let entry = self
            .tenants
            .get(tenant)
            .map(|e| e.value().clone())
            .ok_or_else(|| SuggestError::NoData(tenant.to_string()))?;
        let mut data = SuggestData::from_records(self.name.clone(), entry.records)
            .with_modification_time(entry.modified)
            .with_locale(entry.locale);
        data.sharpened_queries = entry.sharpened;
        data.relaxed_queries = entry.relaxed;
        Ok(data)
    }
}
