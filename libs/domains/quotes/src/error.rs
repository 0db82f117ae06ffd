use domain_catalog::{CatalogError, RequirementMismatch};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ResourceKind;

/// Result type for quote operations
pub type QuoteResult<T> = Result<T, QuoteError>;

/// Errors that can occur in the quote domain
#[derive(Debug, Error)]
pub enum QuoteError {
    /// No catalog price satisfies the requirements of a resource
    #[error("No {kind} price matches the requirements of '{resource}'")]
    NoMatchingPrice { kind: ResourceKind, resource: String },

    /// The resolved price no longer satisfies the requirements of a resource
    #[error("Type '{type_name}' of '{resource}' does not satisfy '{field}': {detail}")]
    IncompatibleRequirements {
        resource: String,
        field: String,
        type_name: String,
        detail: String,
    },

    /// Quote, resource or attached resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The attachment would make a resource (transitively) attached to itself
    #[error("Attaching {resource} to {target} would create a cycle")]
    AttachmentCycle { resource: Uuid, target: Uuid },

    /// The attachment target cannot host the resource
    #[error("{resource} cannot be attached to {target}")]
    InvalidAttachment { resource: Uuid, target: Uuid },

    /// Catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuoteError {
    /// Stable machine key of the error, for user-facing messages
    pub fn code(&self) -> &'static str {
        match self {
            QuoteError::NoMatchingPrice {
                kind: ResourceKind::Instance,
                ..
            } => "no-match-instance",
            QuoteError::NoMatchingPrice {
                kind: ResourceKind::Storage,
                ..
            } => "no-match-storage",
            QuoteError::IncompatibleRequirements { .. } => "type-incompatible-requirements",
            QuoteError::NotFound(_) | QuoteError::Catalog(CatalogError::NotFound(_)) => {
                "entity-not-found"
            }
            QuoteError::InvalidInput(_) | QuoteError::Catalog(CatalogError::InvalidInput(_)) => {
                "invalid-input"
            }
            QuoteError::AttachmentCycle { .. } => "attachment-cycle",
            QuoteError::InvalidAttachment { .. } => "invalid-attachment",
            QuoteError::Internal(_) => "internal",
        }
    }

    pub(crate) fn incompatible(
        resource: &str,
        type_name: &str,
        mismatch: RequirementMismatch,
    ) -> Self {
        QuoteError::IncompatibleRequirements {
            resource: resource.to_string(),
            field: mismatch.field.to_string(),
            type_name: type_name.to_string(),
            detail: mismatch.detail,
        }
    }
}

impl From<validator::ValidationErrors> for QuoteError {
    fn from(err: validator::ValidationErrors) -> Self {
        QuoteError::InvalidInput(err.to_string())
    }
}
