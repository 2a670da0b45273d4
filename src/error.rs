use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SuggestError {
    /// Loading or indexing a tenant's data failed. The previous snapshot, if any, stays live.
    #[error("Build failed for tenant {tenant}: {reason}")]
    Build { tenant: String, reason: String },

    /// No snapshot was ever loaded for the tenant.
    #[error("No suggest data available for tenant: {0}")]
    NoData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manager is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SuggestError>;

impl From<std::io::Error> for SuggestError {
    fn from(e: std::io::Error) -> Self {
        SuggestError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SuggestError {
    fn from(e: tantivy::TantivyError) -> Self {
        SuggestError::Tantivy(e.to_string())
    }
}

impl From<serde_json::Error> for SuggestError {
    fn from(e: serde_json::Error) -> Self {
        SuggestError::Json(e.to_string())
    }
}

impl SuggestError {
    pub fn build(tenant: &str, reason: impl std::fmt::Display) -> Self {
        SuggestError::Build {
            tenant: tenant.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error means "tenant unavailable" rather than a failed operation,
    /// so callers can tell it apart from an empty result.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SuggestError::NoData(_) | SuggestError::Build { .. })
    }

    /// Wraps a lower-level failure as a build error for `tenant`, keeping
    /// build errors that already name a tenant untouched.
    pub fn into_build(self, tenant: &str) -> Self {
        match self {
            SuggestError::Build { .. } | SuggestError::NoData(_) => self,
            other => SuggestError::build(tenant, other),
        }
    }
}
