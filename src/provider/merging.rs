use super::{RecordStream, SuggestData, SuggestDataProvider, NO_MODIFICATION_TIME};
use crate::error::Result;
use std::sync::Arc;

/// Presents several providers as one: records are concatenated in provider
/// order and each record is tagged with the data type it came from, so the
/// data type can drive grouping.
pub struct MergingDataProvider {
    name: String,
    providers: Vec<Arc<dyn SuggestDataProvider>>,
}

impl MergingDataProvider {
    pub fn new(providers: Vec<Arc<dyn SuggestDataProvider>>) -> Self {
        let name = providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join("+");
        MergingDataProvider { name, providers }
    }
}

impl SuggestDataProvider for MergingDataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data(&self, tenant: &str) -> bool {
        self.providers.iter().any(|p| p.has_data(tenant))
    }

    fn last_modification_time(&self, tenant: &str) -> Result<i64> {
        let mut latest = NO_MODIFICATION_TIME;
        for provider in self.providers.iter().filter(|p| p.has_data(tenant)) {
            latest = latest.max(provider.last_modification_time(tenant)?);
        }
        Ok(latest)
    }

    fn load_data(&self, tenant: &str) -> Result<SuggestData> {
        let mut loaded = Vec::new();
        for provider in self.providers.iter().filter(|p| p.has_data(tenant)) {
            loaded.push(provider.load_data(tenant)?);
        }

        let mut merged =
            SuggestData::from_stream(self.name.clone(), Box::new(std::iter::empty()));
        let mut streams: Vec<RecordStream> = Vec::with_capacity(loaded.len());
        for data in loaded {
            if merged.locale.is_empty() {
                merged.locale = data.locale;
            }
            merged.modification_time = merged.modification_time.max(data.modification_time);
            for (term, targets) in data.sharpened_queries {
                merged.sharpened_queries.entry(term).or_default().extend(targets);
            }
            for (term, targets) in data.relaxed_queries {
                merged.relaxed_queries.entry(term).or_default().extend(targets);
            }
            merged.words_to_ignore.extend(data.words_to_ignore);

            let data_type = data.data_type;
            streams.push(Box::new(data.records.map(move |item| {
                item.map(|mut record| {
                    record.tags.insert(data_type.clone());
                    record
                })
            })));
        }
        merged.records = Box::new(streams.into_iter().flatten());
        Ok(merged)
    }
}
