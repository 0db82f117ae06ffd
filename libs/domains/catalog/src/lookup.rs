//! Price lookup: filter a catalog by requirements, estimate each remaining
//! entry's unit cost and rank by it.
//!
//! Ranking keys, in order: estimated unit cost (rounded), cost of one whole
//! billing period, type name, then price code. The result is fully
//! deterministic for a given catalog.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::cost::round_cost;
use crate::models::{Catalog, CatalogPrice, InstancePrice, StoragePrice};
use crate::requirements::{InstanceRequirements, LookupContext, StorageRequirements};

/// Result cap used by interactive lookups
pub const INTERACTIVE_LOOKUP_LIMIT: usize = 10;

/// A price satisfying the requirements, with its estimated unit cost
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate<P> {
    pub price: P,
    /// Estimated monthly cost of one unit, rounded
    pub cost: f64,
}

fn rank<P: CatalogPrice>(a: &(&P, f64), b: &(&P, f64)) -> Ordering {
    a.1.total_cmp(&b.1)
        .then_with(|| a.0.cost_period().total_cmp(&b.0.cost_period()))
        .then_with(|| a.0.type_name().cmp(b.0.type_name()))
        .then_with(|| a.0.code().cmp(b.0.code()))
}

fn select<'a, P, I>(candidates: I, limit: Option<usize>) -> Vec<Candidate<P>>
where
    P: CatalogPrice + Clone + 'a,
    I: Iterator<Item = (&'a P, f64)>,
{
    let mut ranked: Vec<(&P, f64)> = candidates.collect();
    ranked.sort_by(|a, b| rank(a, b));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
        .into_iter()
        .map(|(price, cost)| Candidate {
            price: price.clone(),
            cost,
        })
        .collect()
}

/// Instance prices satisfying the requirements, cheapest first.
///
/// An empty result is not an error; callers decide whether a missing match
/// is fatal.
pub fn lookup_instance(
    catalog: &Catalog,
    requirements: &InstanceRequirements,
    ctx: &LookupContext,
    limit: Option<usize>,
) -> Vec<Candidate<InstancePrice>> {
    let candidates = catalog
        .instance_prices
        .iter()
        .filter(|price| requirements.accepts(price, ctx).is_ok())
        .map(|price| (price, round_cost(requirements.unit_cost(price, ctx))));
    let result = select(candidates, limit);
    debug!(
        provider = %catalog.provider,
        cpu = requirements.cpu,
        ram_mb = requirements.ram_mb,
        matches = result.len(),
        "Instance lookup"
    );
    result
}

/// Storage prices satisfying the requirements, cheapest first
pub fn lookup_storage(
    catalog: &Catalog,
    requirements: &StorageRequirements,
    ctx: &LookupContext,
    limit: Option<usize>,
) -> Vec<Candidate<StoragePrice>> {
    let candidates = catalog
        .storage_prices
        .iter()
        .filter(|price| requirements.accepts(price, ctx).is_ok())
        .map(|price| (price, round_cost(requirements.unit_cost(price))));
    let result = select(candidates, limit);
    debug!(
        provider = %catalog.provider,
        size_gb = requirements.size_gb,
        matches = result.len(),
        "Storage lookup"
    );
    result
}
