//! Catalog Domain
//!
//! Read-only reference data offered by a provider (locations, billing terms,
//! resource types and their prices) and the lookup engine selecting the
//! cheapest price entries that satisfy a resource's requirements.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    Lookup    │  ← Filtering, unit cost estimation, ranking
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ Requirements │  ← Hard constraints and per-kind cost formulas
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │  Repository  │  ← Materialized catalog snapshots (trait + in-memory)
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │    Models    │  ← Locations, terms, types, prices
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_catalog::{
//!     lookup, Catalog, InstanceRequirements, LookupContext, INTERACTIVE_LOOKUP_LIMIT,
//! };
//!
//! let catalog = Catalog::new("provider-1");
//! let ctx = LookupContext::new("region-1");
//! let requirements = InstanceRequirements::new(2.0, 4096);
//!
//! let candidates =
//!     lookup::lookup_instance(&catalog, &requirements, &ctx, Some(INTERACTIVE_LOOKUP_LIMIT));
//! if let Some(best) = candidates.first() {
//!     println!("{} at {}", best.price.code, best.cost);
//! }
//! ```

pub mod cost;
pub mod error;
pub mod lookup;
pub mod models;
pub mod repository;
pub mod requirements;

// Re-export commonly used types
pub use cost::{COST_SCALE, round_cost};
pub use error::{CatalogError, CatalogResult};
pub use lookup::{Candidate, INTERACTIVE_LOOKUP_LIMIT};
pub use models::{
    Catalog, CatalogPrice, CreateInstancePrice, CreateStoragePrice, InstancePrice, InstanceType,
    LICENSE_BYOL, LICENSE_INCLUDED, License, Location, Rate, StorageOptimized, StoragePrice,
    StorageType, Tenancy, Term, VmOs,
};
pub use repository::{CatalogRepository, InMemoryCatalogRepository};
pub use requirements::{
    DEFAULT_RAM_ADJUSTED_RATE, InstanceRequirements, LookupContext, RequirementMismatch,
    StorageRequirements, Usage,
};
