//! Unit cost formulas shared by the lookup ranking and the quote costing.
//!
//! A unit cost is the monthly cost of one unit of a resource at the
//! requested size, before any quantity scaling.

use crate::models::{InstancePrice, StoragePrice};

/// Number of decimal places kept on stored monetary values
pub const COST_SCALE: u32 = 3;

/// Round half-up to [`COST_SCALE`] decimal places.
///
/// Costs are never negative, so rounding half away from zero is half-up.
pub fn round_cost(value: f64) -> f64 {
    let factor = 10f64.powi(COST_SCALE as i32);
    (value * factor).round() / factor
}

/// Monthly cost of a storage price for the requested size.
///
/// The billed size is floored at the storage type's minimal size.
pub fn storage_unit_cost(price: &StoragePrice, size_gb: u32) -> f64 {
    f64::from(size_gb).max(price.storage_type.minimal_gb) * price.cost_gb + price.cost
}

/// Monthly cost of an instance price for the requested vCPU and RAM
/// (already adjusted) and a usage rate in percent.
///
/// Dynamic types are billed per vCPU and per GB of RAM on top of their base
/// cost, fixed types at their recurring rate. Pay-per-use terms only bill
/// the fraction of time the resource runs.
pub fn instance_unit_cost(price: &InstancePrice, cpu: f64, ram_mb: u32, usage_rate: u32) -> f64 {
    let instance_type = &price.instance_type;
    let mut cost = price.cost;
    if instance_type.dynamic {
        let cpu = cpu.max(instance_type.cpu);
        let ram_gb = f64::from(ram_mb.max(instance_type.ram_mb)) / 1024.0;
        cost += price.cost_cpu.unwrap_or(0.0) * cpu + price.cost_ram.unwrap_or(0.0) * ram_gb;
    }
    if price.term.is_pay_per_use() {
        cost * f64::from(usage_rate) / 100.0
    } else {
        cost
    }
}
