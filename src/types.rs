use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Tenant identifier, e.g. one storefront or catalog.
pub type TenantId = String;

/// Upper bound for `secondary_text`, in bytes.
pub const MAX_SECONDARY_TEXT_BYTES: usize = 32 * 1024;

/// A weighted text unit fed into a suggest index.
///
/// `primary_text` is searched first, `secondary_text` only when the primary
/// matches are insufficient. The record is immutable once built into an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRecord {
    pub primary_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub weight: i64,
}

impl SuggestRecord {
    pub fn new(primary_text: impl Into<String>, weight: i64) -> Self {
        SuggestRecord {
            primary_text: primary_text.into(),
            secondary_text: None,
            payload: None,
            tags: BTreeSet::new(),
            weight,
        }
    }

    pub fn with_secondary_text(mut self, text: impl Into<String>) -> Self {
        let mut text = text.into();
        truncate_at_boundary(&mut text, MAX_SECONDARY_TEXT_BYTES);
        self.secondary_text = Some(text);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// The value handed back to callers; falls back to the primary text.
    pub fn payload(&self) -> &str {
        self.payload.as_deref().unwrap_or(&self.primary_text)
    }

    /// Enforces the secondary text size bound on records that were
    /// deserialized rather than built through `with_secondary_text`.
    pub(crate) fn clamp_secondary(&mut self) {
        if let Some(text) = self.secondary_text.as_mut() {
            truncate_at_boundary(text, MAX_SECONDARY_TEXT_BYTES);
        }
        if self.secondary_text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.secondary_text = None;
        }
    }
}

fn truncate_at_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// How a suggestion was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    Primary,
    Secondary,
    Fuzzy1,
    Fuzzy2,
    /// Words of the query matched a reordered primary text.
    Shingle,
    Sharpened,
    Relaxed,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Primary => "primary",
            MatchKind::Secondary => "secondary",
            MatchKind::Fuzzy1 => "fuzzy1",
            MatchKind::Fuzzy2 => "fuzzy2",
            MatchKind::Shingle => "shingle",
            MatchKind::Sharpened => "sharpened",
            MatchKind::Relaxed => "relaxed",
        }
    }
}

/// One entry of a suggest response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub phrase: String,
    /// Group the suggestion was counted against.
    #[serde(rename = "type")]
    pub group: String,
    pub payload: String,
    pub weight: i64,
    pub kind: MatchKind,
}

/// Restricts lookups to records carrying at least one of the given tags.
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    tags: BTreeSet<String>,
}

impl TagFilter {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter {
            tags: tags
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// Builds a filter from request parameters: every value is a
    /// comma-separated tag list, and all lists are unioned.
    pub fn from_filter_map(filters: &HashMap<String, String>) -> Self {
        TagFilter::new(
            filters
                .values()
                .flat_map(|v| v.split(','))
                .map(|t| t.trim().to_string()),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn matches(&self, record: &SuggestRecord) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| record.tags.contains(t))
    }
}
