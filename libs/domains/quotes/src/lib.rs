//! Quotes Domain
//!
//! Quotes of compute and storage resources priced from a provider catalog,
//! with `{min, max, unbound}` cost ranges kept consistent as resources are
//! added, edited or removed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Service   │  ← Loads, resolves prices, persists (one aggregate per call)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Engine    │  ← Resource recompute, attachment folding, quote aggregate
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │    Quote    │  ← Attachment checks, invalidation rules
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Quote store (trait + in-memory)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Quote, resources, DTOs, floating costs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use core_config::CostingConfig;
//! use domain_catalog::{Catalog, InMemoryCatalogRepository};
//! use domain_quotes::{CreateQuote, InMemoryQuoteRepository, InstanceEdition, QuoteService};
//!
//! # async fn example() -> domain_quotes::QuoteResult<()> {
//! let catalogs = InMemoryCatalogRepository::with_catalog(Catalog::new("provider-1"));
//! let service = QuoteService::new(
//!     InMemoryQuoteRepository::new(),
//!     catalogs,
//!     CostingConfig::default(),
//! );
//!
//! let quote = service
//!     .create_quote(CreateQuote {
//!         name: "web platform".to_string(),
//!         description: None,
//!         provider: "provider-1".to_string(),
//!         location: "region-1".to_string(),
//!         license: None,
//!         usage: None,
//!         ram_adjusted_rate: None,
//!     })
//!     .await?;
//!
//! let updated = service
//!     .create_instance(quote.id, InstanceEdition::new("web", 2.0, 4096))
//!     .await?;
//! println!("{} .. {}", updated.total.min, updated.total.max);
//! # Ok(())
//! # }
//! ```

pub mod costed;
pub mod engine;
pub mod error;
pub mod floating_cost;
pub mod models;
pub mod quote;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use costed::Costed;
pub use engine::CostEngine;
pub use error::{QuoteError, QuoteResult};
pub use floating_cost::FloatingCost;
pub use models::{
    BatchFailure, BatchPolicy, BatchReport, CreateQuote, ImportEntry, InstanceEdition,
    InstanceImport, QuantityBounds, Quote, QuoteEdition, QuotedInstance, QuotedStorage,
    Recomputed, ResourceKind, ResourceState, StorageEdition, UpdatedCost,
};
pub use quote::Checkpoint;
pub use repository::{InMemoryQuoteRepository, QuoteRepository};
pub use service::QuoteService;
