//! Resource requirements and the hard-constraint predicate used both to
//! filter lookup results and to revalidate an already resolved price.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cost::{instance_unit_cost, storage_unit_cost};
use crate::models::{InstancePrice, License, Rate, StorageOptimized, StoragePrice, Tenancy, VmOs};

/// Default RAM adjusted rate, in percent
pub const DEFAULT_RAM_ADJUSTED_RATE: u32 = 100;

/// Usage profile of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub name: String,
    /// Percentage of time the resource runs, `1..=100`
    pub rate: u32,
    /// Total expected usage duration in months, at least `1`
    pub duration_months: u32,
}

impl Usage {
    pub fn new(name: impl Into<String>, rate: u32, duration_months: u32) -> Self {
        Self {
            name: name.into(),
            rate,
            duration_months,
        }
    }
}

/// Quote-level ambient values a lookup depends on.
///
/// Always passed explicitly so lookups stay pure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupContext {
    /// Location used when the requirements do not pin one
    pub default_location: String,
    /// License used when the requirements do not specify one
    pub default_license: Option<String>,
    /// Percentage applied to the requested RAM before matching
    pub ram_adjusted_rate: u32,
    /// Usage used when the requirements do not specify one
    pub default_usage: Option<Usage>,
}

impl LookupContext {
    pub fn new(default_location: impl Into<String>) -> Self {
        Self {
            default_location: default_location.into(),
            default_license: None,
            ram_adjusted_rate: DEFAULT_RAM_ADJUSTED_RATE,
            default_usage: None,
        }
    }

    pub fn with_ram_adjusted_rate(mut self, rate: u32) -> Self {
        self.ram_adjusted_rate = rate;
        self
    }

    pub fn with_license(mut self, license: Option<String>) -> Self {
        self.default_license = license;
        self
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.default_usage = usage;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }
}

/// A hard constraint a price does not satisfy
#[derive(Debug, Clone, PartialEq, Error)]
#[error("requirement '{field}' is not satisfied: {detail}")]
pub struct RequirementMismatch {
    /// Name of the offending requirement field
    pub field: &'static str,
    pub detail: String,
}

impl RequirementMismatch {
    fn new(field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            field,
            detail: detail.into(),
        }
    }
}

/// Requirements of a compute resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequirements {
    /// Minimal vCPU count
    pub cpu: f64,
    /// Minimal RAM in MB, before adjustment
    pub ram_mb: u32,
    /// Required constant CPU flag, when any
    #[serde(default)]
    pub constant: Option<bool>,
    #[serde(default)]
    pub os: VmOs,
    #[serde(default)]
    pub tenancy: Tenancy,
    pub license: Option<String>,
    /// Term name or code, when any
    pub term: Option<String>,
    /// Accept terms the provider can reclaim
    #[serde(default)]
    pub ephemeral: bool,
    /// Ceiling of the unit cost accepted on variable-priced terms
    pub max_variable_cost: Option<f64>,
    pub usage: Option<Usage>,
    pub location: Option<String>,
}

impl InstanceRequirements {
    pub fn new(cpu: f64, ram_mb: u32) -> Self {
        Self {
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
        }
    }

    /// Location applied to the lookup
    pub fn resolved_location<'a>(&'a self, ctx: &'a LookupContext) -> &'a str {
        self.location.as_deref().unwrap_or(&ctx.default_location)
    }

    /// Requested RAM multiplied by the adjusted rate, rounded up to a whole MB
    pub fn adjusted_ram(&self, ctx: &LookupContext) -> u32 {
        let adjusted = (u64::from(self.ram_mb) * u64::from(ctx.ram_adjusted_rate)).div_ceil(100);
        u32::try_from(adjusted).unwrap_or(u32::MAX)
    }

    /// Usage rate applied to pay-per-use terms, in percent
    pub fn usage_rate(&self, ctx: &LookupContext) -> u32 {
        self.usage
            .as_ref()
            .or(ctx.default_usage.as_ref())
            .map_or(100, |u| u.rate)
    }

    /// Estimated monthly cost of one unit at the requested size
    pub fn unit_cost(&self, price: &InstancePrice, ctx: &LookupContext) -> f64 {
        instance_unit_cost(price, self.cpu, self.adjusted_ram(ctx), self.usage_rate(ctx))
    }

    /// Check every hard constraint against a price
    pub fn accepts(
        &self,
        price: &InstancePrice,
        ctx: &LookupContext,
    ) -> Result<(), RequirementMismatch> {
        let location = self.resolved_location(ctx);
        if price.location != location {
            return Err(RequirementMismatch::new(
                "location",
                format!("price is in '{}', expected '{}'", price.location, location),
            ));
        }
        if price.os != self.os {
            return Err(RequirementMismatch::new(
                "os",
                format!("price is for {}, expected {}", price.os, self.os),
            ));
        }
        if price.tenancy != self.tenancy {
            return Err(RequirementMismatch::new(
                "tenancy",
                format!("price is {}, expected {}", price.tenancy, self.tenancy),
            ));
        }

        let license = self.license.as_deref().or(ctx.default_license.as_deref());
        if License::from_tag(price.license.as_deref()) != License::from_tag(license) {
            return Err(RequirementMismatch::new(
                "license",
                format!(
                    "price license is {:?}, expected {:?}",
                    price.license.as_deref().unwrap_or("INCLUDED"),
                    license.unwrap_or("INCLUDED")
                ),
            ));
        }

        let instance_type = &price.instance_type;
        if !instance_type.dynamic {
            if instance_type.cpu < self.cpu {
                return Err(RequirementMismatch::new(
                    "cpu",
                    format!(
                        "{} provides {} vCPU, {} required",
                        instance_type.name, instance_type.cpu, self.cpu
                    ),
                ));
            }
            let ram = self.adjusted_ram(ctx);
            if instance_type.ram_mb < ram {
                return Err(RequirementMismatch::new(
                    "ram",
                    format!(
                        "{} provides {} MB, {} MB required",
                        instance_type.name, instance_type.ram_mb, ram
                    ),
                ));
            }
        }
        if let Some(constant) = self.constant {
            if instance_type.constant != Some(constant) {
                return Err(RequirementMismatch::new(
                    "constant",
                    format!("{} does not match constant={}", instance_type.name, constant),
                ));
            }
        }

        let term = &price.term;
        if let Some(requested) = self.term.as_deref() {
            if term.name != requested && term.code != requested {
                return Err(RequirementMismatch::new(
                    "term",
                    format!("price term is '{}', expected '{}'", term.name, requested),
                ));
            }
        }
        if term.ephemeral && !self.ephemeral {
            return Err(RequirementMismatch::new(
                "ephemeral",
                format!("term '{}' can be reclaimed by the provider", term.name),
            ));
        }
        if let Some(usage) = self.usage.as_ref().or(ctx.default_usage.as_ref()) {
            if term.period_months > usage.duration_months {
                return Err(RequirementMismatch::new(
                    "usage",
                    format!(
                        "term '{}' commits {} months, usage lasts {}",
                        term.name, term.period_months, usage.duration_months
                    ),
                ));
            }
        }
        if term.variable {
            if let Some(max) = self.max_variable_cost {
                let cost = self.unit_cost(price, ctx);
                if cost > max {
                    return Err(RequirementMismatch::new(
                        "max_variable_cost",
                        format!("variable cost {cost} exceeds {max}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Requirements of a storage resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRequirements {
    /// Requested size in GB
    pub size_gb: u32,
    /// Minimal latency class, when any
    pub latency: Option<Rate>,
    pub optimized: Option<StorageOptimized>,
    pub location: Option<String>,
    /// Instance this storage is attached to, when any
    pub instance: Option<Uuid>,
}

impl StorageRequirements {
    pub fn new(size_gb: u32) -> Self {
        Self {
            size_gb,
            latency: None,
            optimized: None,
            location: None,
            instance: None,
        }
    }

    /// Location applied to the lookup
    pub fn resolved_location<'a>(&'a self, ctx: &'a LookupContext) -> &'a str {
        self.location.as_deref().unwrap_or(&ctx.default_location)
    }

    /// Estimated monthly cost of one unit at the requested size
    pub fn unit_cost(&self, price: &StoragePrice) -> f64 {
        storage_unit_cost(price, self.size_gb)
    }

    /// Check every hard constraint against a price
    pub fn accepts(
        &self,
        price: &StoragePrice,
        ctx: &LookupContext,
    ) -> Result<(), RequirementMismatch> {
        let location = self.resolved_location(ctx);
        if price.location != location {
            return Err(RequirementMismatch::new(
                "location",
                format!("price is in '{}', expected '{}'", price.location, location),
            ));
        }

        let storage_type = &price.storage_type;
        if let Some(latency) = self.latency {
            if storage_type.latency < latency {
                return Err(RequirementMismatch::new(
                    "latency",
                    format!(
                        "{} is {}, {} required",
                        storage_type.name, storage_type.latency, latency
                    ),
                ));
            }
        }
        if let Some(optimized) = self.optimized {
            if storage_type.optimized != Some(optimized) {
                return Err(RequirementMismatch::new(
                    "optimized",
                    format!("{} is not optimized for {}", storage_type.name, optimized),
                ));
            }
        }
        if let Some(maximal) = storage_type.maximal_gb {
            if f64::from(self.size_gb) > maximal {
                return Err(RequirementMismatch::new(
                    "size",
                    format!(
                        "{} supports up to {} GB, {} requested",
                        storage_type.name, maximal, self.size_gb
                    ),
                ));
            }
        }
        if self.instance.is_some() && !storage_type.instance_compatible {
            return Err(RequirementMismatch::new(
                "instance",
                format!("{} cannot be attached to an instance", storage_type.name),
            ));
        }
        Ok(())
    }
}
