use thiserror::Error;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur in the catalog domain
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog, location, type or price not found
    #[error("Catalog entry not found: {0}")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
