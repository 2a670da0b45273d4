use super::{SuggestData, SuggestDataProvider, NO_MODIFICATION_TIME};
use crate::error::{Result, SuggestError};
use crate::types::SuggestRecord;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Optional `<tenant>.meta.json` next to the records file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DataMeta {
    data_type: Option<String>,
    locale: String,
    sharpened_queries: HashMap<String, Vec<String>>,
    relaxed_queries: HashMap<String, Vec<String>>,
    words_to_ignore: HashSet<String>,
}

/// Reads `<dir>/<tenant>.jsonl`, one [`SuggestRecord`] JSON object per line.
/// The file's mtime is the tenant's modification time. Records are parsed
/// lazily while the index is built; a malformed line fails the build.
pub struct JsonLinesDataProvider {
    name: String,
    dir: PathBuf,
}

impl JsonLinesDataProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        JsonLinesDataProvider {
            name: "jsonl".to_string(),
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn file(&self, tenant: &str, suffix: &str) -> Option<PathBuf> {
        let safe = !tenant.is_empty()
            && tenant != "."
            && tenant != ".."
            && !tenant.contains(['/', '\\']);
        safe.then(|| self.dir.join(format!("{}{}", tenant, suffix)))
    }

    fn records_file(&self, tenant: &str) -> Option<PathBuf> {
        self.file(tenant, ".jsonl")
    }

    fn load_meta(&self, tenant: &str) -> Result<DataMeta> {
        match self.file(tenant, ".meta.json") {
            Some(path) if path.is_file() => {
                let content = std::fs::read_to_string(&path)?;
                Ok(serde_json::from_str(&content)?)
            }
            _ => Ok(DataMeta::default()),
        }
    }
}

impl SuggestDataProvider for JsonLinesDataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data(&self, tenant: &str) -> bool {
        self.records_file(tenant).is_some_and(|p| p.is_file())
    }

    fn last_modification_time(&self, tenant: &str) -> Result<i64> {
        let Some(path) = self.records_file(tenant).filter(|p| p.is_file()) else {
            return Ok(NO_MODIFICATION_TIME);
        };
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis())
    }

    fn load_data(&self, tenant: &str) -> Result<SuggestData> {
        let path = self
            .records_file(tenant)
            .filter(|p| p.is_file())
            .ok_or_else(|| SuggestError::NoData(tenant.to_string()))?;
        let modified = self.last_modification_time(tenant)?;
        let meta = self.load_meta(tenant)?;
        let reader = BufReader::new(File::open(&path)?);

        let records = reader
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|(n, line)| -> Result<SuggestRecord> {
                let line = line?;
                serde_json::from_str::<SuggestRecord>(&line)
                    .map_err(|e| SuggestError::Json(format!("line {}: {}", n + 1, e)))
            });

        let mut data = SuggestData::from_stream(
            meta.data_type.unwrap_or_else(|| self.name.clone()),
            Box::new(records),
        )
        .with_modification_time(modified)
        .with_locale(meta.locale);
        data.sharpened_queries = meta.sharpened_queries;
        data.relaxed_queries = meta.relaxed_queries;
        data.words_to_ignore = meta.words_to_ignore;
        Ok(data)
    }
}
