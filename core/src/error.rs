use std::path::PathBuf;

/// Failures while locating, reading, parsing or repairing an OpenAPI document.
///
/// Every variant is fatal at startup except `Parse { duplicate_key: true, .. }`,
/// which the loader hands to the repair chain first.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("OpenAPI spec file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read OpenAPI spec '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse OpenAPI spec: {message}")]
    Parse { message: String, duplicate_key: bool },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The built-in minimal document failed to parse. Only a broken fallback
    /// generator can produce this.
    #[error("Every repair strategy failed, including the minimal fallback spec: {message}")]
    RepairExhausted { message: String },
}

impl SpecError {
    /// Machine-readable code, used in the startup error payload.
    pub fn code(&self) -> &'static str {
        match self {
            SpecError::NotFound { .. } => "spec_not_found",
            SpecError::Read { .. } => "spec_unreadable",
            SpecError::Parse { .. } => "spec_parse_failed",
            SpecError::Write { .. } => "spec_write_failed",
            SpecError::RepairExhausted { .. } => "spec_repair_exhausted",
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            SpecError::Parse {
                duplicate_key: true,
                ..
            }
        )
    }
}

pub type Result<T, E = SpecError> = std::result::Result<T, E>;
