//! Cost propagation over a caller-owned quote.
//!
//! A resource cost is recomputed from its resolved price, folded into the
//! contribution of its root (an instance with its attached storages, or an
//! unattached storage), and the quote aggregate is the sum of live root
//! contributions. The engine holds no state besides the quote it borrows
//! and its pass counter; callers serialize access per quote.
//!
//! Batch callers recompute each resource, then call
//! [`CostEngine::recompute_quote_total`] once.

use std::collections::BTreeMap;

use domain_catalog::{CatalogPrice, LookupContext, round_cost};
use tracing::debug;
use uuid::Uuid;

use crate::costed::Costed;
use crate::error::{QuoteError, QuoteResult};
use crate::floating_cost::FloatingCost;
use crate::models::{QuantityBounds, Quote, Recomputed, ResourceKind};

/// Revalidate and price one resource at the given quantity bounds
fn price_resource<R: Costed>(
    resource: &mut R,
    ctx: &LookupContext,
    bounds: QuantityBounds,
) -> QuoteResult<FloatingCost> {
    resource.revalidate(ctx).map_err(|mismatch| {
        QuoteError::incompatible(resource.name(), resource.price().type_name(), mismatch)
    })?;
    // Quantities scale the unit cost as rounded for ranking
    let unit = round_cost(resource.unit_cost(ctx));
    let initial = resource.price().initial_cost().unwrap_or(0.0);
    resource.store_initial_cost(FloatingCost::from_quantity(initial, bounds.min, bounds.max));
    let cost = resource.store_cost(FloatingCost::from_quantity(unit, bounds.min, bounds.max));
    let kind = R::KIND;
    debug!(
        kind = %kind,
        resource_id = %resource.id(),
        unit_cost = unit,
        cost = cost.min,
        max_cost = cost.max,
        unbound = cost.unbound,
        initial_cost = initial,
        "Recomputed resource cost"
    );
    Ok(cost)
}

pub struct CostEngine<'q> {
    quote: &'q mut Quote,
    passes: usize,
}

impl<'q> CostEngine<'q> {
    pub fn new(quote: &'q mut Quote) -> Self {
        Self { quote, passes: 0 }
    }

    pub fn quote(&self) -> &Quote {
        self.quote
    }

    /// Aggregate passes run by this engine
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Recompute one resource.
    ///
    /// An instance also recomputes its attached storages, reported under
    /// `related`.
    pub fn recompute(&mut self, id: Uuid) -> QuoteResult<Recomputed> {
        match self.quote.resource_kind(id)? {
            ResourceKind::Instance => {
                let cost = self.recompute_instance(id)?;
                let mut related = BTreeMap::new();
                for storage in self.quote.attached_storage_ids(id) {
                    related.insert(storage, self.recompute_storage(storage)?);
                }
                let contribution = self.contribution(id)?;
                Ok(Recomputed {
                    id,
                    kind: ResourceKind::Instance,
                    cost,
                    contribution,
                    related,
                })
            }
            ResourceKind::Storage => {
                let cost = self.recompute_storage(id)?;
                let host = self.quote.storage(id)?.instance();
                let contribution = match host {
                    Some(host) => self.contribution(host)?,
                    None => cost,
                };
                Ok(Recomputed {
                    id,
                    kind: ResourceKind::Storage,
                    cost,
                    contribution,
                    related: BTreeMap::new(),
                })
            }
        }
    }

    fn recompute_instance(&mut self, id: Uuid) -> QuoteResult<FloatingCost> {
        let ctx = self.quote.lookup_context();
        let instance = self.quote.instance_mut(id)?;
        let bounds = instance.quantity;
        price_resource(instance, &ctx, bounds)
    }

    fn recompute_storage(&mut self, id: Uuid) -> QuoteResult<FloatingCost> {
        let (ctx, bounds) = {
            let storage = self.quote.storage(id)?;
            let bounds = self.quote.storage_quantity(storage)?;
            (self.quote.storage_context(&storage.requirements), bounds)
        };
        let storage = self.quote.storage_mut(id)?;
        price_resource(storage, &ctx, bounds)
    }

    /// Recompute the resource when its stored cost is not trusted
    fn ensure_priced(&mut self, id: Uuid) -> QuoteResult<()> {
        match self.quote.resource_kind(id)? {
            ResourceKind::Instance => {
                if self.quote.instance(id)?.state.needs_recompute() {
                    self.recompute_instance(id)?;
                }
            }
            ResourceKind::Storage => {
                if self.quote.storage(id)?.state.needs_recompute() {
                    self.recompute_storage(id)?;
                }
            }
        }
        Ok(())
    }

    /// Effective contribution of a root resource to the quote total
    pub fn contribution(&mut self, id: Uuid) -> QuoteResult<FloatingCost> {
        self.ensure_priced(id)?;
        match self.quote.resource_kind(id)? {
            ResourceKind::Instance => {
                let mut total = self.quote.instance(id)?.stored_cost();
                for storage in self.quote.attached_storage_ids(id) {
                    self.ensure_priced(storage)?;
                    total += self.quote.storage(storage)?.stored_cost();
                }
                Ok(total)
            }
            ResourceKind::Storage => Ok(self.quote.storage(id)?.stored_cost()),
        }
    }

    /// Recompute the quote aggregate.
    ///
    /// Unpriced and stale resources are recomputed first; removed ones are
    /// skipped. Each call is one aggregate pass.
    pub fn recompute_quote_total(&mut self) -> QuoteResult<FloatingCost> {
        let pending_instances: Vec<Uuid> = self
            .quote
            .live_instances()
            .filter(|i| i.state.needs_recompute())
            .map(|i| i.id)
            .collect();
        for id in pending_instances {
            self.recompute_instance(id)?;
        }
        let pending_storages: Vec<Uuid> = self
            .quote
            .live_storages()
            .filter(|s| s.state.needs_recompute())
            .map(|s| s.id)
            .collect();
        for id in pending_storages {
            self.recompute_storage(id)?;
        }

        // Every live storage is counted once, attached ones through their host
        let instances: FloatingCost = self.quote.live_instances().map(Costed::stored_cost).sum();
        let storages: FloatingCost = self.quote.live_storages().map(Costed::stored_cost).sum();
        let total = (instances + storages).round();
        let initial: FloatingCost = self
            .quote
            .live_instances()
            .map(Costed::stored_initial_cost)
            .chain(self.quote.live_storages().map(Costed::stored_initial_cost))
            .sum();
        let initial = initial.round();

        self.quote.cost = total.min;
        self.quote.max_cost = total.max;
        self.quote.unbound_cost = total.unbound;
        self.quote.initial_cost = initial.min;
        self.quote.max_initial_cost = initial.max;
        self.quote.updated_at = chrono::Utc::now();
        self.passes += 1;

        debug!(
            quote_id = %self.quote.id,
            cost = total.min,
            max_cost = total.max,
            unbound = total.unbound,
            initial_cost = initial.min,
            "Recomputed quote total"
        );
        Ok(total)
    }

    /// Zero the contribution of resources and recompute the aggregate, in
    /// one pass. Removing an instance removes its attached storages.
    ///
    /// The resources stay in the quote, marked removed, until
    /// [`Quote::purge_removed`] runs.
    pub fn remove(&mut self, ids: &[Uuid]) -> QuoteResult<FloatingCost> {
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            if removed.contains(&id) {
                continue;
            }
            match self.quote.resource_kind(id)? {
                ResourceKind::Instance => {
                    let attached = self.quote.attached_storage_ids(id);
                    self.quote.instance_mut(id)?.mark_removed();
                    for storage in attached {
                        self.quote.storage_mut(storage)?.mark_removed();
                        removed.push(storage);
                    }
                }
                ResourceKind::Storage => self.quote.storage_mut(id)?.mark_removed(),
            }
            removed.push(id);
        }
        self.recompute_quote_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateQuote, InstanceEdition, QuotedInstance, QuotedStorage, ResourceState,
        StorageEdition,
    };
    use domain_catalog::Catalog;
    use test_utils::assertions::assert_close;
    use test_utils::fixtures::{self, REGION};

    fn quote() -> Quote {
        Quote::new(CreateQuote {
            name: "quote".to_string(),
            description: None,
            provider: fixtures::PROVIDER.to_string(),
            location: REGION.to_string(),
            license: None,
            usage: None,
            ram_adjusted_rate: None,
        })
    }

    fn instance(catalog: &Catalog, code: &str, min: u32, max: Option<u32>) -> QuotedInstance {
        let mut edition = InstanceEdition::new("web", 0.5, 2000);
        edition.min_quantity = min;
        edition.max_quantity = max;
        QuotedInstance::new(&edition, fixtures::instance_price(catalog, code))
    }

    fn storage(catalog: &Catalog, size_gb: u32, host: Option<Uuid>) -> QuotedStorage {
        let mut edition = StorageEdition::new("data", size_gb);
        edition.instance = host;
        QuotedStorage::new(&edition, fixtures::storage_price(catalog, "S1"))
    }

    #[test]
    fn test_attached_storage_scales_with_host() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let host = quote.push_instance(instance(&catalog, "C2", 2, Some(10)));
        let data = quote.push_storage(storage(&catalog, 20, Some(host))).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let result = engine.recompute(data).unwrap();

        assert_eq!(result.kind, ResourceKind::Storage);
        assert_eq!(result.cost, FloatingCost::new(8.4, 42.0, false));
        // Host at 102.48 x 2..10 plus the storage
        assert_close(result.contribution.min, 204.96 + 8.4, "contribution min");
        assert_close(result.contribution.max, 1024.8 + 42.0, "contribution max");
    }

    #[test]
    fn test_quantity_scales_rounded_unit_cost() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let host = quote.push_instance(instance(&catalog, "C2", 10, Some(10)));
        let mut cold = storage(&catalog, 5, Some(host));
        cold.price.cost_gb = 0.00033;
        let cold = quote.push_storage(cold).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let result = engine.recompute(cold).unwrap();

        // 5 x 0.00033 = 0.00165, billed 0.002 per unit
        assert_eq!(result.cost, FloatingCost::new(0.02, 0.02, false));
    }

    #[test]
    fn test_initial_cost_follows_quantity() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let mut web = instance(&catalog, "C2", 2, Some(10));
        web.price.initial_cost = Some(300.0);
        let web = quote.push_instance(web);
        let mut data = storage(&catalog, 20, Some(web));
        data.price.initial_cost = Some(1.5);
        quote.push_storage(data).unwrap();
        quote.push_storage(storage(&catalog, 20, None)).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        engine.recompute_quote_total().unwrap();
        assert_eq!(quote.instance(web).unwrap().initial_cost, 600.0);
        assert_eq!(quote.instance(web).unwrap().max_initial_cost, 3000.0);
        assert_eq!(quote.initial_total(), FloatingCost::new(603.0, 3015.0, false));

        let mut engine = CostEngine::new(&mut quote);
        engine.remove(&[web]).unwrap();
        assert!(quote.initial_total().is_zero());
        assert_close(quote.cost, 4.2, "remaining storage");
    }

    #[test]
    fn test_instance_recompute_reports_attached_storages() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let host = quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        let data = quote.push_storage(storage(&catalog, 20, Some(host))).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let result = engine.recompute(host).unwrap();

        assert_eq!(result.cost, FloatingCost::fixed(102.48));
        assert_eq!(result.related.get(&data), Some(&FloatingCost::fixed(4.2)));
        assert_close(result.contribution.min, 106.68, "contribution");
        assert_eq!(quote.storage(data).unwrap().state, ResourceState::Priced);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let host = quote.push_instance(instance(&catalog, "C2", 1, None));
        quote.push_storage(storage(&catalog, 20, Some(host))).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let first = engine.recompute(host).unwrap();
        let second = engine.recompute(host).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cost.min.to_bits(), second.cost.min.to_bits());
        assert_eq!(first.cost.max.to_bits(), second.cost.max.to_bits());
    }

    #[test]
    fn test_total_recomputes_pending_resources_once() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let host = quote.push_instance(instance(&catalog, "C2", 1, Some(2)));
        quote.push_storage(storage(&catalog, 20, Some(host))).unwrap();
        quote.push_storage(storage(&catalog, 100, None)).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let total = engine.recompute_quote_total().unwrap();
        assert_eq!(engine.passes(), 1);

        // 102.48 x 1..2 + 4.2 x 1..2 + 21
        assert_close(total.min, 102.48 + 4.2 + 21.0, "total min");
        assert_close(total.max, 204.96 + 8.4 + 21.0, "total max");
        assert!(!total.unbound);
        assert_eq!(quote.cost, total.min);
        assert!(quote.live_instances().all(|i| i.state == ResourceState::Priced));
    }

    #[test]
    fn test_unbound_resource_flags_total() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        let mut logs = storage(&catalog, 1, None);
        logs.quantity = QuantityBounds::new(1, None);
        let scaling = quote.push_storage(logs).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let total = engine.recompute_quote_total().unwrap();
        assert!(total.unbound);
        assert!(quote.unbound_cost);
        // Minimal billed size of storage1 is 5 GB
        assert_eq!(quote.storage(scaling).unwrap().cost, 1.05);
    }

    #[test]
    fn test_remove_reduces_total_by_contribution() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let web = quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        let db = quote.push_instance(instance(&catalog, "C4", 1, None));
        let root = quote.push_storage(storage(&catalog, 20, Some(db))).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let before = engine.recompute_quote_total().unwrap();
        assert!(before.unbound);
        let contribution = engine.contribution(db).unwrap();

        let after = engine.remove(&[db]).unwrap();
        assert_eq!(engine.passes(), 2);
        assert_close(after.min, before.min - contribution.min, "min after removal");
        assert_close(after.max, before.max - contribution.max, "max after removal");
        assert!(!after.unbound);

        // Removed resources stay until purged, zeroed
        assert_eq!(quote.storages[0].state, ResourceState::Removed);
        assert_eq!(quote.storages[0].cost, 0.0);
        let mut purged = quote.purge_removed();
        purged.sort();
        let mut expected = vec![db, root];
        expected.sort();
        assert_eq!(purged, expected);
        assert!(quote.instance(web).is_ok());
    }

    #[test]
    fn test_remove_many_is_one_pass() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        let a = quote.push_storage(storage(&catalog, 20, None)).unwrap();
        let b = quote.push_storage(storage(&catalog, 40, None)).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let total = engine.remove(&[a, b]).unwrap();
        assert_eq!(engine.passes(), 1);
        assert_eq!(total, FloatingCost::fixed(102.48));
    }

    #[test]
    fn test_incompatible_price_names_field() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let web = quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        quote.instance_mut(web).unwrap().requirements.ram_mb = 3000;

        let mut engine = CostEngine::new(&mut quote);
        let err = engine.recompute(web).unwrap_err();
        assert!(matches!(
            err,
            QuoteError::IncompatibleRequirements { ref field, ref type_name, .. }
                if field == "ram" && type_name == "instance1"
        ));
    }

    #[test]
    fn test_attachment_to_incompatible_type_is_rejected() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let web = quote.push_instance(instance(&catalog, "C2", 1, Some(1)));
        let mut object = storage(&catalog, 20, Some(web));
        object.price = fixtures::storage_price(&catalog, "S4");
        let id = quote.push_storage(object).unwrap();

        let mut engine = CostEngine::new(&mut quote);
        let err = engine.recompute(id).unwrap_err();
        assert!(matches!(
            err,
            QuoteError::IncompatibleRequirements { ref field, .. } if field == "instance"
        ));
    }

    #[test]
    fn test_removed_resource_is_not_found() {
        let catalog = fixtures::sample_catalog();
        let mut quote = quote();
        let web = quote.push_instance(instance(&catalog, "C2", 1, Some(1)));

        let mut engine = CostEngine::new(&mut quote);
        engine.remove(&[web]).unwrap();
        assert!(matches!(engine.recompute(web), Err(QuoteError::NotFound(_))));
        assert!(engine.quote().total().is_zero());
    }
}
