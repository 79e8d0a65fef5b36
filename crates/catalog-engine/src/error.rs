use crate::sort::SortDiagnostic;

/// Unified error type for the catalog engine.
///
/// Cloneable so that one fragment fetch outcome can be handed to every caller
/// waiting on it; I/O and parse failures are therefore carried as messages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid volume: {0}")]
    InvalidVolume(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown level: {0}")]
    UnknownLevel(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("sort validation failed for level {}", .0.level)]
    SortValidation(SortDiagnostic),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using [`CatalogError`].
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
