use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Special license tag: the license is bundled in the price
pub const LICENSE_INCLUDED: &str = "INCLUDED";

/// Special license tag: bring your own license
pub const LICENSE_BYOL: &str = "BYOL";

/// Performance class of a storage type. Ordered from worst to best.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Rate {
    Worst,
    Low,
    #[default]
    Medium,
    Good,
    Best,
}

/// Optimization tag of a storage type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageOptimized {
    Throughput,
    Durability,
    Iops,
}

/// Operating system of an instance price
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VmOs {
    #[default]
    Linux,
    Windows,
    Suse,
    Rhel,
}

/// Tenancy of an instance price
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tenancy {
    #[default]
    Shared,
    Dedicated,
}

/// Normalized license model used for matching
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum License {
    /// Bundled in the price, or not applicable
    Included,
    /// Bring your own license
    Byol,
    /// Any other provider-specific tag, upper-cased
    Other(String),
}

impl License {
    /// Normalize an optional license tag. `None` and `"INCLUDED"` are the same model.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            None | Some("") => License::Included,
            Some(t) if t.eq_ignore_ascii_case(LICENSE_INCLUDED) => License::Included,
            Some(t) if t.eq_ignore_ascii_case(LICENSE_BYOL) => License::Byol,
            Some(t) => License::Other(t.to_ascii_uppercase()),
        }
    }
}

/// A named region with geographic attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique name, used for matching
    pub name: String,
    pub description: Option<String>,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub subregion: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            continent: None,
            country: None,
            subregion: None,
            latitude: None,
            longitude: None,
        }
    }
}

/// Billing commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: Uuid,
    pub name: String,
    /// Opaque provider identifier
    pub code: String,
    pub description: Option<String>,
    /// Billing period in months. Any started period is due. `0` means a
    /// billing period below one month (pay-per-use).
    pub period_months: u32,
    /// The price may vary within the period
    pub variable: bool,
    /// The resource can be reclaimed by the provider
    pub ephemeral: bool,
}

impl Term {
    pub fn new(name: impl Into<String>, code: impl Into<String>, period_months: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            code: code.into(),
            description: None,
            period_months,
            variable: false,
            ephemeral: false,
        }
    }

    /// Whether the term is billed per use, below one month
    pub fn is_pay_per_use(&self) -> bool {
        self.period_months == 0
    }
}

/// Technical characteristics of an instance type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// vCPU count
    pub cpu: f64,
    /// RAM in MB
    pub ram_mb: u32,
    /// Constant CPU performance. `None` when unknown.
    pub constant: Option<bool>,
    /// Sized on demand, priced per vCPU and per GB of RAM
    pub dynamic: bool,
}

impl InstanceType {
    pub fn new(name: impl Into<String>, cpu: f64, ram_mb: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            cpu,
            ram_mb,
            constant: None,
            dynamic: false,
        }
    }
}

/// Technical characteristics of a storage type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub latency: Rate,
    pub optimized: Option<StorageOptimized>,
    /// Minimum billed size in GB
    pub minimal_gb: f64,
    /// Largest supported size in GB. `None` when unbounded.
    pub maximal_gb: Option<f64>,
    pub iops: u32,
    /// Throughput in MB/s
    pub throughput: u32,
    /// Can be attached to an instance
    pub instance_compatible: bool,
}

impl StorageType {
    pub fn new(name: impl Into<String>, latency: Rate) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            latency,
            optimized: None,
            minimal_gb: 1.0,
            maximal_gb: None,
            iops: 0,
            throughput: 0,
            instance_compatible: false,
        }
    }
}

/// Common view over the price entries of any resource kind
pub trait CatalogPrice {
    fn id(&self) -> Uuid;

    /// Unique provider code of this price
    fn code(&self) -> &str;

    /// Name of the referenced resource type
    fn type_name(&self) -> &str;

    /// Location name this price is pinned to
    fn location(&self) -> &str;

    fn term(&self) -> &Term;

    /// Recurring monthly rate
    fn cost(&self) -> f64;

    /// One-time cost, when any
    fn initial_cost(&self) -> Option<f64>;

    /// Recurring cost of one whole billing period, initial cost included
    fn cost_period(&self) -> f64;
}

/// Cost of one whole billing period of a term
fn period_cost(term: &Term, cost: f64, initial_cost: Option<f64>) -> f64 {
    cost * f64::from(term.period_months.max(1)) + initial_cost.unwrap_or(0.0)
}

/// Price of an instance type for one (term, location, OS, license, tenancy) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePrice {
    pub id: Uuid,
    pub code: String,
    pub instance_type: InstanceType,
    pub term: Term,
    pub location: String,
    pub os: VmOs,
    pub tenancy: Tenancy,
    /// `None` or `"INCLUDED"` when bundled, `"BYOL"` when brought by the user
    pub license: Option<String>,
    /// Recurring monthly rate, initial cost amortized
    pub cost: f64,
    pub initial_cost: Option<f64>,
    /// Derived from term, cost and initial cost
    pub cost_period: f64,
    /// Monthly cost per vCPU, dynamic types only
    pub cost_cpu: Option<f64>,
    /// Monthly cost per GB of RAM, dynamic types only
    pub cost_ram: Option<f64>,
}

impl CatalogPrice for InstancePrice {
    fn id(&self) -> Uuid {
        self.id
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn type_name(&self) -> &str {
        &self.instance_type.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn term(&self) -> &Term {
        &self.term
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn initial_cost(&self) -> Option<f64> {
        self.initial_cost
    }

    fn cost_period(&self) -> f64 {
        self.cost_period
    }
}

/// DTO for loading a new instance price into a catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstancePrice {
    pub code: String,
    pub instance_type: InstanceType,
    pub term: Term,
    pub location: String,
    #[serde(default)]
    pub os: VmOs,
    #[serde(default)]
    pub tenancy: Tenancy,
    pub license: Option<String>,
    pub cost: f64,
    pub initial_cost: Option<f64>,
    pub cost_cpu: Option<f64>,
    pub cost_ram: Option<f64>,
}

impl From<CreateInstancePrice> for InstancePrice {
    fn from(input: CreateInstancePrice) -> Self {
        let cost_period = period_cost(&input.term, input.cost, input.initial_cost);
        Self {
            id: Uuid::now_v7(),
            code: input.code,
            instance_type: input.instance_type,
            term: input.term,
            location: input.location,
            os: input.os,
            tenancy: input.tenancy,
            license: input.license,
            cost: input.cost,
            initial_cost: input.initial_cost,
            cost_period,
            cost_cpu: input.cost_cpu,
            cost_ram: input.cost_ram,
        }
    }
}

/// Price of a storage type in one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePrice {
    pub id: Uuid,
    pub code: String,
    pub storage_type: StorageType,
    pub term: Term,
    pub location: String,
    /// Fixed monthly cost
    pub cost: f64,
    /// Monthly cost per GB
    pub cost_gb: f64,
    /// Cost per I/O transaction
    pub cost_transaction: f64,
    pub initial_cost: Option<f64>,
    pub cost_period: f64,
}

impl CatalogPrice for StoragePrice {
    fn id(&self) -> Uuid {
        self.id
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn type_name(&self) -> &str {
        &self.storage_type.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn term(&self) -> &Term {
        &self.term
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn initial_cost(&self) -> Option<f64> {
        self.initial_cost
    }

    fn cost_period(&self) -> f64 {
        self.cost_period
    }
}

/// DTO for loading a new storage price into a catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoragePrice {
    pub code: String,
    pub storage_type: StorageType,
    pub term: Term,
    pub location: String,
    #[serde(default)]
    pub cost: f64,
    pub cost_gb: f64,
    #[serde(default)]
    pub cost_transaction: f64,
    pub initial_cost: Option<f64>,
}

impl From<CreateStoragePrice> for StoragePrice {
    fn from(input: CreateStoragePrice) -> Self {
        let cost_period = period_cost(&input.term, input.cost, input.initial_cost);
        Self {
            id: Uuid::now_v7(),
            code: input.code,
            storage_type: input.storage_type,
            term: input.term,
            location: input.location,
            cost: input.cost,
            cost_gb: input.cost_gb,
            cost_transaction: input.cost_transaction,
            initial_cost: input.initial_cost,
            cost_period,
        }
    }
}

/// Materialized, read-only view of a provider catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Provider scope key
    pub provider: String,
    pub locations: Vec<Location>,
    pub terms: Vec<Term>,
    pub instance_prices: Vec<InstancePrice>,
    pub storage_prices: Vec<StoragePrice>,
}

impl Catalog {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    /// Find a location by name
    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }

    /// Find an instance price by its unique code
    pub fn instance_price(&self, code: &str) -> Option<&InstancePrice> {
        self.instance_prices.iter().find(|p| p.code == code)
    }

    /// Find a storage price by its unique code
    pub fn storage_price(&self, code: &str) -> Option<&StoragePrice> {
        self.storage_prices.iter().find(|p| p.code == code)
    }

    /// Find the price of a storage type in a location
    pub fn storage_price_by_type(&self, type_name: &str, location: &str) -> Option<&StoragePrice> {
        self.storage_prices
            .iter()
            .find(|p| p.storage_type.name == type_name && p.location == location)
    }

    /// Add an instance price
    pub fn add_instance_price(&mut self, input: CreateInstancePrice) -> &InstancePrice {
        self.register_term(&input.term);
        self.instance_prices.push(input.into());
        &self.instance_prices[self.instance_prices.len() - 1]
    }

    /// Add a storage price
    pub fn add_storage_price(&mut self, input: CreateStoragePrice) -> &StoragePrice {
        self.register_term(&input.term);
        self.storage_prices.push(input.into());
        &self.storage_prices[self.storage_prices.len() - 1]
    }

    fn register_term(&mut self, term: &Term) {
        if !self.terms.iter().any(|t| t.id == term.id) {
            self.terms.push(term.clone());
        }
    }
}
