use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use domain_catalog::{
    DEFAULT_RAM_ADJUSTED_RATE, InstancePrice, InstanceRequirements, Rate, StorageOptimized,
    StoragePrice, StorageRequirements, Tenancy, Usage, VmOs,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::floating_cost::FloatingCost;

/// Validate a usage profile: rate within 1..=100, at least one month
fn validate_usage(usage: &Usage) -> Result<(), ValidationError> {
    if !(1..=100).contains(&usage.rate) {
        return Err(ValidationError::new("usage_rate_out_of_range"));
    }
    if usage.duration_months == 0 {
        return Err(ValidationError::new("usage_duration_zero"));
    }
    Ok(())
}

fn validate_quantity(min: u32, max: Option<u32>) -> Result<(), ValidationError> {
    match max {
        Some(max) if max < min => Err(ValidationError::new("max_quantity_below_min_quantity")),
        _ => Ok(()),
    }
}

fn validate_instance_quantity(edition: &InstanceEdition) -> Result<(), ValidationError> {
    validate_quantity(edition.min_quantity, edition.max_quantity)
}

fn validate_storage_quantity(edition: &StorageEdition) -> Result<(), ValidationError> {
    validate_quantity(edition.min_quantity, edition.max_quantity)
}

fn default_quantity() -> u32 {
    1
}

fn default_storage_max_quantity() -> Option<u32> {
    Some(1)
}

fn default_ram_adjusted_rate() -> u32 {
    DEFAULT_RAM_ADJUSTED_RATE
}

/// Kind of a quoted resource
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Instance,
    Storage,
}

/// Cost lifecycle of a quoted resource
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceState {
    /// Created, cost not computed yet
    #[default]
    Unpriced,
    /// Cost matches the current inputs
    Priced,
    /// An input of the cost changed since the last recompute
    Stale,
    /// Contribution zeroed, waiting for physical deletion
    Removed,
}

impl ResourceState {
    /// Whether the stored cost must be recomputed before use
    pub fn needs_recompute(self) -> bool {
        matches!(self, ResourceState::Unpriced | ResourceState::Stale)
    }
}

/// Quantity bounds of a resource. `max: None` means unbounded scale-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityBounds {
    pub min: u32,
    pub max: Option<u32>,
}

impl QuantityBounds {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub fn fixed(quantity: u32) -> Self {
        Self::new(quantity, Some(quantity))
    }

    /// Product of two bounds; unbounded when either side is
    pub fn times(self, other: QuantityBounds) -> Self {
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.saturating_mul(b)),
            _ => None,
        };
        Self::new(self.min.saturating_mul(other.min), max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }
}

impl Default for QuantityBounds {
    fn default() -> Self {
        Self::fixed(1)
    }
}

/// A compute resource of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedInstance {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub requirements: InstanceRequirements,
    pub quantity: QuantityBounds,
    /// Resolved price
    pub price: InstancePrice,
    /// Computed minimal monthly cost, never user-supplied
    pub cost: f64,
    /// Computed maximal monthly cost
    pub max_cost: f64,
    pub unbound_cost: bool,
    /// Computed minimal one-time cost
    pub initial_cost: f64,
    /// Computed maximal one-time cost
    pub max_initial_cost: f64,
    pub state: ResourceState,
}

impl QuotedInstance {
    /// A new instance, with zero cost until the engine prices it
    pub fn new(edition: &InstanceEdition, price: InstancePrice) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: edition.name.clone(),
            description: edition.description.clone(),
            requirements: edition.requirements(),
            quantity: edition.quantity(),
            price,
            cost: 0.0,
            max_cost: 0.0,
            unbound_cost: false,
            initial_cost: 0.0,
            max_initial_cost: 0.0,
            state: ResourceState::Unpriced,
        }
    }
}

/// A storage resource of a quote, optionally attached to an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedStorage {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Requirements, including the attachment
    pub requirements: StorageRequirements,
    /// Own bounds; multiplied by the host's when attached
    pub quantity: QuantityBounds,
    /// Resolved price
    pub price: StoragePrice,
    /// Computed minimal monthly cost, never user-supplied
    pub cost: f64,
    /// Computed maximal monthly cost
    pub max_cost: f64,
    pub unbound_cost: bool,
    /// Computed minimal one-time cost
    pub initial_cost: f64,
    /// Computed maximal one-time cost
    pub max_initial_cost: f64,
    pub state: ResourceState,
}

impl QuotedStorage {
    /// A new storage, with zero cost until the engine prices it
    pub fn new(edition: &StorageEdition, price: StoragePrice) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: edition.name.clone(),
            description: edition.description.clone(),
            requirements: edition.requirements(),
            quantity: edition.quantity(),
            price,
            cost: 0.0,
            max_cost: 0.0,
            unbound_cost: false,
            initial_cost: 0.0,
            max_initial_cost: 0.0,
            state: ResourceState::Unpriced,
        }
    }

    /// Instance this storage is attached to
    pub fn instance(&self) -> Option<Uuid> {
        self.requirements.instance
    }
}

/// Quote entity - the owning aggregate of quoted resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Catalog scope key
    pub provider: String,
    /// Default location of the resources
    pub location: String,
    /// Default license, `None` when bundled
    pub license: Option<String>,
    /// Default usage profile
    pub usage: Option<Usage>,
    /// Percentage applied to requested RAM during lookups
    pub ram_adjusted_rate: u32,
    /// Aggregate minimal monthly cost
    pub cost: f64,
    /// Aggregate maximal monthly cost
    pub max_cost: f64,
    /// At least one live resource scales without bound
    pub unbound_cost: bool,
    /// Aggregate minimal one-time cost
    pub initial_cost: f64,
    /// Aggregate maximal one-time cost
    pub max_initial_cost: f64,
    pub instances: Vec<QuotedInstance>,
    pub storages: Vec<QuotedStorage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(input: CreateQuote) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: input.name,
            description: input.description,
            provider: input.provider,
            location: input.location,
            license: input.license,
            usage: input.usage,
            ram_adjusted_rate: input
                .ram_adjusted_rate
                .unwrap_or(DEFAULT_RAM_ADJUSTED_RATE),
            cost: 0.0,
            max_cost: 0.0,
            unbound_cost: false,
            initial_cost: 0.0,
            max_initial_cost: 0.0,
            instances: Vec::new(),
            storages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Aggregate cost as stored
    pub fn total(&self) -> FloatingCost {
        FloatingCost::new(self.cost, self.max_cost, self.unbound_cost)
    }

    /// Aggregate one-time cost as stored
    pub fn initial_total(&self) -> FloatingCost {
        FloatingCost::new(self.initial_cost, self.max_initial_cost, self.unbound_cost)
    }
}

/// DTO for creating a new quote
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuote {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub provider: String,
    #[validate(length(min = 1))]
    pub location: String,
    pub license: Option<String>,
    #[validate(custom(function = "validate_usage"))]
    pub usage: Option<Usage>,
    #[validate(range(min = 1, max = 1000))]
    pub ram_adjusted_rate: Option<u32>,
}

/// DTO replacing the editable attributes of a quote
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuoteEdition {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub location: String,
    pub license: Option<String>,
    #[validate(custom(function = "validate_usage"))]
    pub usage: Option<Usage>,
    #[serde(default = "default_ram_adjusted_rate")]
    #[validate(range(min = 1, max = 1000))]
    pub ram_adjusted_rate: u32,
    /// Re-resolve every resource to its current cheapest price
    #[serde(default)]
    pub refresh: bool,
}

/// DTO for creating or replacing a quoted instance
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_instance_quantity"))]
pub struct InstanceEdition {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub cpu: f64,
    #[validate(range(min = 1))]
    pub ram_mb: u32,
    #[serde(default)]
    pub constant: Option<bool>,
    #[serde(default)]
    pub os: VmOs,
    #[serde(default)]
    pub tenancy: Tenancy,
    pub license: Option<String>,
    /// Term name or code
    pub term: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
    #[validate(range(min = 0.0))]
    pub max_variable_cost: Option<f64>,
    #[validate(custom(function = "validate_usage"))]
    pub usage: Option<Usage>,
    pub location: Option<String>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub min_quantity: u32,
    pub max_quantity: Option<u32>,
    /// Explicit price code; the cheapest match is used when absent
    pub price: Option<String>,
}

impl InstanceEdition {
    pub fn new(name: impl Into<String>, cpu: f64, ram_mb: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            cpu,
            ram_mb,
            constant: None,
            os: VmOs::default(),
            tenancy: Tenancy::default(),
            license: None,
            term: None,
            ephemeral: false,
            max_variable_cost: None,
            usage: None,
            location: None,
            min_quantity: 1,
            max_quantity: Some(1),
            price: None,
        }
    }

    pub fn requirements(&self) -> InstanceRequirements {
        InstanceRequirements {
            cpu: self.cpu,
            ram_mb: self.ram_mb,
            constant: self.constant,
            os: self.os,
            tenancy: self.tenancy,
            license: self.license.clone(),
            term: self.term.clone(),
            ephemeral: self.ephemeral,
            max_variable_cost: self.max_variable_cost,
            usage: self.usage.clone(),
            location: self.location.clone(),
        }
    }

    pub fn quantity(&self) -> QuantityBounds {
        QuantityBounds::new(self.min_quantity, self.max_quantity)
    }
}

/// DTO for creating or replacing a quoted storage
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_storage_quantity"))]
pub struct StorageEdition {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub size_gb: u32,
    pub latency: Option<Rate>,
    pub optimized: Option<StorageOptimized>,
    pub location: Option<String>,
    /// Instance to attach to
    pub instance: Option<Uuid>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub min_quantity: u32,
    #[serde(default = "default_storage_max_quantity")]
    pub max_quantity: Option<u32>,
    /// Explicit storage type name; the cheapest match is used when absent
    pub storage_type: Option<String>,
}

impl StorageEdition {
    pub fn new(name: impl Into<String>, size_gb: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            size_gb,
            latency: None,
            optimized: None,
            location: None,
            instance: None,
            min_quantity: 1,
            max_quantity: Some(1),
            storage_type: None,
        }
    }

    pub fn requirements(&self) -> StorageRequirements {
        StorageRequirements {
            size_gb: self.size_gb,
            latency: self.latency,
            optimized: self.optimized,
            location: self.location.clone(),
            instance: self.instance,
        }
    }

    pub fn quantity(&self) -> QuantityBounds {
        QuantityBounds::new(self.min_quantity, self.max_quantity)
    }
}

/// Result of a single-resource recompute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recomputed {
    pub id: Uuid,
    pub kind: ResourceKind,
    /// Stand-alone cost of the resource
    pub cost: FloatingCost,
    /// Contribution to the quote total of the root owning this resource:
    /// an instance with its attached storages, or an unattached storage
    pub contribution: FloatingCost,
    /// Other resources recomputed as a side effect
    pub related: BTreeMap<Uuid, FloatingCost>,
}

/// Costs updated by a mutating operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedCost {
    pub id: Uuid,
    pub cost: FloatingCost,
    pub contribution: FloatingCost,
    pub related: BTreeMap<Uuid, FloatingCost>,
    /// New quote total
    pub total: FloatingCost,
}

impl UpdatedCost {
    pub fn new(recomputed: Recomputed, total: FloatingCost) -> Self {
        Self {
            id: recomputed.id,
            cost: recomputed.cost,
            contribution: recomputed.contribution,
            related: recomputed.related,
            total,
        }
    }
}

/// An instance to import with the storages attached to it
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceImport {
    #[serde(flatten)]
    pub instance: InstanceEdition,
    /// Attached to the imported instance, their `instance` is ignored
    #[serde(default)]
    pub storages: Vec<StorageEdition>,
}

/// One entry of a batch import
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportEntry {
    Instance(InstanceImport),
    Storage(StorageEdition),
}

impl ImportEntry {
    pub fn name(&self) -> &str {
        match self {
            ImportEntry::Instance(import) => &import.instance.name,
            ImportEntry::Storage(edition) => &edition.name,
        }
    }
}

/// What a batch does when one of its entries fails
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchPolicy {
    /// Fail the whole batch, nothing is persisted
    #[default]
    Abort,
    /// Skip the failing entry and report it
    SkipAndReport,
}

/// A skipped batch entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Position of the entry in the batch
    pub index: usize,
    pub name: String,
    /// Stable error key
    pub code: String,
    pub message: String,
}

/// Outcome of a batch import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Created resource ids, in creation order
    pub created: Vec<Uuid>,
    pub failures: Vec<BatchFailure>,
    /// Quote total after the batch
    pub total: FloatingCost,
}
