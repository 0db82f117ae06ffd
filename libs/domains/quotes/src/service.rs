//! Quote service layer

use std::sync::Arc;

use core_config::CostingConfig;
use domain_catalog::{
    Candidate, Catalog, CatalogPrice, CatalogRepository, InstancePrice, InstanceRequirements,
    LookupContext, RequirementMismatch, StoragePrice, StorageRequirements, lookup,
};
use observability::{CostingMetrics, CostingTimer};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::costed::Costed;
use crate::engine::CostEngine;
use crate::error::{QuoteError, QuoteResult};
use crate::floating_cost::FloatingCost;
use crate::models::{
    BatchFailure, BatchPolicy, BatchReport, CreateQuote, ImportEntry, InstanceEdition, Quote,
    QuoteEdition, QuotedInstance, QuotedStorage, ResourceKind, ResourceState, StorageEdition,
    UpdatedCost,
};
use crate::repository::QuoteRepository;

/// Cheapest instance price for the requirements
fn best_instance(
    catalog: &Catalog,
    ctx: &LookupContext,
    name: &str,
    requirements: &InstanceRequirements,
) -> QuoteResult<Candidate<InstancePrice>> {
    lookup::lookup_instance(catalog, requirements, ctx, Some(1))
        .into_iter()
        .next()
        .ok_or_else(|| {
            warn!(resource = %name, provider = %catalog.provider, "No instance price matches");
            CostingMetrics::record_no_match("instance", &catalog.provider);
            QuoteError::NoMatchingPrice {
                kind: ResourceKind::Instance,
                resource: name.to_string(),
            }
        })
}

/// Cheapest storage price for the requirements
fn best_storage(
    catalog: &Catalog,
    ctx: &LookupContext,
    name: &str,
    requirements: &StorageRequirements,
) -> QuoteResult<Candidate<StoragePrice>> {
    lookup::lookup_storage(catalog, requirements, ctx, Some(1))
        .into_iter()
        .next()
        .ok_or_else(|| {
            warn!(resource = %name, provider = %catalog.provider, "No storage price matches");
            CostingMetrics::record_no_match("storage", &catalog.provider);
            QuoteError::NoMatchingPrice {
                kind: ResourceKind::Storage,
                resource: name.to_string(),
            }
        })
}

fn rejected(
    kind: ResourceKind,
    resource: &str,
    type_name: &str,
    mismatch: RequirementMismatch,
) -> QuoteError {
    warn!(
        kind = %kind,
        resource = %resource,
        type_name = %type_name,
        field = mismatch.field,
        "Requested type does not satisfy the requirements"
    );
    CostingMetrics::record_incompatible(&kind.to_string(), mismatch.field);
    QuoteError::incompatible(resource, type_name, mismatch)
}

/// Price of an instance edition: the named price when given, after checking
/// it against the requirements, else the cheapest match
fn instance_price_for(
    catalog: &Catalog,
    ctx: &LookupContext,
    edition: &InstanceEdition,
) -> QuoteResult<InstancePrice> {
    let requirements = edition.requirements();
    let Some(code) = edition.price.as_deref() else {
        return best_instance(catalog, ctx, &edition.name, &requirements).map(|c| c.price);
    };

    let price = catalog
        .instance_price(code)
        .ok_or_else(|| QuoteError::NotFound(format!("instance price '{code}'")))?;
    requirements
        .accepts(price, ctx)
        .map_err(|m| rejected(ResourceKind::Instance, &edition.name, price.type_name(), m))?;
    Ok(price.clone())
}

/// Price of a storage edition: the price of the named type at the resolved
/// location when given, after checking it, else the cheapest match
fn storage_price_for(
    catalog: &Catalog,
    ctx: &LookupContext,
    edition: &StorageEdition,
) -> QuoteResult<StoragePrice> {
    let requirements = edition.requirements();
    let Some(type_name) = edition.storage_type.as_deref() else {
        return best_storage(catalog, ctx, &edition.name, &requirements).map(|c| c.price);
    };

    let location = requirements.resolved_location(ctx);
    let price = catalog
        .storage_price_by_type(type_name, location)
        .ok_or_else(|| {
            QuoteError::NotFound(format!("storage type '{type_name}' in '{location}'"))
        })?;
    requirements
        .accepts(price, ctx)
        .map_err(|m| rejected(ResourceKind::Storage, &edition.name, type_name, m))?;
    Ok(price.clone())
}

/// Validate, price and append a storage
fn add_storage(
    catalog: &Catalog,
    quote: &mut Quote,
    edition: &StorageEdition,
) -> QuoteResult<Uuid> {
    edition.validate()?;
    let ctx = quote.storage_context(&edition.requirements());
    let price = storage_price_for(catalog, &ctx, edition)?;
    quote.push_storage(QuotedStorage::new(edition, price))
}

/// Replace the price of an instance with the cheapest match. Unless
/// `force`, a price still satisfying the requirements is kept.
/// Returns whether the price changed.
fn reprice_instance(
    catalog: &Catalog,
    quote: &mut Quote,
    id: Uuid,
    force: bool,
) -> QuoteResult<bool> {
    let ctx = quote.lookup_context();
    let instance = quote.instance(id)?;
    if !force && instance.revalidate(&ctx).is_ok() {
        return Ok(false);
    }
    let best = best_instance(catalog, &ctx, &instance.name, &instance.requirements)?;
    if best.price.id == instance.price.id {
        return Ok(false);
    }
    quote.set_instance_price(id, best.price)?;
    Ok(true)
}

/// Storage counterpart of [`reprice_instance`]
fn reprice_storage(
    catalog: &Catalog,
    quote: &mut Quote,
    id: Uuid,
    force: bool,
) -> QuoteResult<bool> {
    let storage = quote.storage(id)?;
    let ctx = quote.storage_context(&storage.requirements);
    if !force && storage.revalidate(&ctx).is_ok() {
        return Ok(false);
    }
    let best = best_storage(catalog, &ctx, &storage.name, &storage.requirements)?;
    if best.price.id == storage.price.id {
        return Ok(false);
    }
    quote.set_storage_price(id, best.price)?;
    Ok(true)
}

/// Create one batch entry and recompute what it created
fn apply_entry(
    catalog: &Catalog,
    quote: &mut Quote,
    entry: &ImportEntry,
) -> QuoteResult<Vec<Uuid>> {
    match entry {
        ImportEntry::Instance(import) => {
            import.instance.validate()?;
            let price = instance_price_for(catalog, &quote.lookup_context(), &import.instance)?;
            let id = quote.push_instance(QuotedInstance::new(&import.instance, price));
            let mut created = vec![id];
            for storage in &import.storages {
                let mut edition = storage.clone();
                edition.instance = Some(id);
                created.push(add_storage(catalog, quote, &edition)?);
            }
            CostEngine::new(quote).recompute(id)?;
            Ok(created)
        }
        ImportEntry::Storage(edition) => {
            let id = add_storage(catalog, quote, edition)?;
            CostEngine::new(quote).recompute(id)?;
            Ok(vec![id])
        }
    }
}

fn record_total(quote: &Quote, total: FloatingCost) {
    CostingMetrics::record_aggregate_pass(quote.live_resource_count());
    CostingMetrics::set_quote_total(&quote.provider, total.min, total.max);
}

/// Service layer keeping quote costs consistent across edits
pub struct QuoteService<Q: QuoteRepository, C: CatalogRepository> {
    quotes: Arc<Q>,
    catalogs: Arc<C>,
    config: CostingConfig,
}

impl<Q: QuoteRepository, C: CatalogRepository> QuoteService<Q, C> {
    pub fn new(quotes: Q, catalogs: C, config: CostingConfig) -> Self {
        Self {
            quotes: Arc::new(quotes),
            catalogs: Arc::new(catalogs),
            config,
        }
    }

    async fn load_quote(&self, id: Uuid) -> QuoteResult<Quote> {
        self.quotes
            .get_by_id(id)
            .await?
            .ok_or_else(|| QuoteError::NotFound(format!("quote {id}")))
    }

    async fn catalog(&self, provider: &str) -> QuoteResult<Arc<Catalog>> {
        Ok(self.catalogs.load(provider).await?)
    }

    async fn ensure_location(&self, provider: &str, location: &str) -> QuoteResult<()> {
        match self.catalogs.find_location(provider, location).await? {
            Some(_) => Ok(()),
            None => Err(QuoteError::NotFound(format!(
                "location '{location}' of provider '{provider}'"
            ))),
        }
    }

    /// Recompute one resource and the aggregate, then persist
    async fn commit(&self, quote: &mut Quote, id: Uuid) -> QuoteResult<UpdatedCost> {
        let (recomputed, total) = {
            let mut engine = CostEngine::new(quote);
            let recomputed = engine.recompute(id)?;
            let total = engine.recompute_quote_total()?;
            (recomputed, total)
        };

        CostingMetrics::record_recompute(&recomputed.kind.to_string());
        for _ in recomputed.related.keys() {
            CostingMetrics::record_recompute("storage");
        }
        record_total(quote, total);

        self.quotes.save(quote).await?;
        Ok(UpdatedCost::new(recomputed, total))
    }

    /// Zero the resources, store the new aggregate, then delete them
    async fn remove(&self, mut quote: Quote, ids: &[Uuid]) -> QuoteResult<FloatingCost> {
        let total = CostEngine::new(&mut quote).remove(ids)?;
        record_total(&quote, total);
        self.quotes.save(&quote).await?;

        let removed_instances = quote
            .instances
            .iter()
            .filter(|i| i.state == ResourceState::Removed)
            .count();
        let purged = quote.purge_removed();
        CostingMetrics::record_removal("instance", removed_instances);
        CostingMetrics::record_removal("storage", purged.len() - removed_instances);

        self.quotes.delete_resources(quote.id, &purged).await?;
        info!(
            quote_id = %quote.id,
            removed = purged.len(),
            cost = total.min,
            max_cost = total.max,
            "Removed quote resources"
        );
        Ok(total)
    }

    /// Create a new quote, with the configured defaults
    #[instrument(skip(self, input), fields(provider = %input.provider))]
    pub async fn create_quote(&self, mut input: CreateQuote) -> QuoteResult<Quote> {
        input.validate()?;
        self.ensure_location(&input.provider, &input.location).await?;

        if input.ram_adjusted_rate.is_none() {
            input.ram_adjusted_rate = Some(self.config.default_ram_adjusted_rate);
        }
        if input.license.is_none() {
            input.license = self.config.default_license.clone();
        }

        let quote = self.quotes.create(input).await?;
        info!(quote_id = %quote.id, "Quote created");
        Ok(quote)
    }

    /// Get a quote by ID
    pub async fn get_quote(&self, id: Uuid) -> QuoteResult<Quote> {
        self.load_quote(id).await
    }

    /// Delete a quote with its resources
    #[instrument(skip(self))]
    pub async fn delete_quote(&self, id: Uuid) -> QuoteResult<()> {
        let deleted = self.quotes.delete(id).await?;

        if !deleted {
            return Err(QuoteError::NotFound(format!("quote {id}")));
        }

        info!(quote_id = %id, "Quote deleted");
        Ok(())
    }

    /// Instance prices matching the requirements within a quote, cheapest
    /// first, capped to the interactive limit
    #[instrument(skip(self, requirements))]
    pub async fn lookup_instances(
        &self,
        quote_id: Uuid,
        requirements: &InstanceRequirements,
    ) -> QuoteResult<Vec<Candidate<InstancePrice>>> {
        let quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let mut timer = CostingTimer::new("lookup_instance");
        let candidates = lookup::lookup_instance(
            &catalog,
            requirements,
            &quote.lookup_context(),
            Some(self.config.lookup_limit),
        );
        let duration_ms = timer.stop();
        CostingMetrics::record_lookup("instance", &quote.provider, candidates.len(), duration_ms);
        Ok(candidates)
    }

    /// Storage counterpart of [`Self::lookup_instances`]
    #[instrument(skip(self, requirements))]
    pub async fn lookup_storages(
        &self,
        quote_id: Uuid,
        requirements: &StorageRequirements,
    ) -> QuoteResult<Vec<Candidate<StoragePrice>>> {
        let quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let mut timer = CostingTimer::new("lookup_storage");
        let candidates = lookup::lookup_storage(
            &catalog,
            requirements,
            &quote.storage_context(requirements),
            Some(self.config.lookup_limit),
        );
        let duration_ms = timer.stop();
        CostingMetrics::record_lookup("storage", &quote.provider, candidates.len(), duration_ms);
        Ok(candidates)
    }

    /// Best instance price for a resource of a quote
    #[instrument(skip(self, requirements))]
    pub async fn resolve_instance_price(
        &self,
        quote_id: Uuid,
        name: &str,
        requirements: &InstanceRequirements,
    ) -> QuoteResult<Candidate<InstancePrice>> {
        let quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;
        best_instance(&catalog, &quote.lookup_context(), name, requirements)
    }

    /// Best storage price for a resource of a quote
    #[instrument(skip(self, requirements))]
    pub async fn resolve_storage_price(
        &self,
        quote_id: Uuid,
        name: &str,
        requirements: &StorageRequirements,
    ) -> QuoteResult<Candidate<StoragePrice>> {
        let quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;
        best_storage(&catalog, &quote.storage_context(requirements), name, requirements)
    }

    /// Add an instance to a quote
    #[instrument(skip(self, edition), fields(name = %edition.name))]
    pub async fn create_instance(
        &self,
        quote_id: Uuid,
        edition: InstanceEdition,
    ) -> QuoteResult<UpdatedCost> {
        edition.validate()?;
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let price = instance_price_for(&catalog, &quote.lookup_context(), &edition)?;
        let id = quote.push_instance(QuotedInstance::new(&edition, price));
        let updated = self.commit(&mut quote, id).await?;

        info!(
            quote_id = %quote_id,
            resource_id = %id,
            cost = updated.cost.min,
            total = updated.total.min,
            "Instance created"
        );
        Ok(updated)
    }

    /// Replace an instance of a quote. Attached storages whose price no
    /// longer fits are moved to their cheapest match.
    #[instrument(skip(self, edition), fields(name = %edition.name))]
    pub async fn update_instance(
        &self,
        quote_id: Uuid,
        id: Uuid,
        edition: InstanceEdition,
    ) -> QuoteResult<UpdatedCost> {
        edition.validate()?;
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let price = instance_price_for(&catalog, &quote.lookup_context(), &edition)?;
        quote.update_instance(id, &edition, price)?;
        for storage in quote.attached_storage_ids(id) {
            reprice_storage(&catalog, &mut quote, storage, false)?;
        }
        let updated = self.commit(&mut quote, id).await?;

        info!(
            quote_id = %quote_id,
            resource_id = %id,
            cost = updated.cost.min,
            total = updated.total.min,
            "Instance updated"
        );
        Ok(updated)
    }

    /// Remove an instance and the storages attached to it
    #[instrument(skip(self))]
    pub async fn delete_instance(&self, quote_id: Uuid, id: Uuid) -> QuoteResult<FloatingCost> {
        let quote = self.load_quote(quote_id).await?;
        quote.instance(id)?;
        self.remove(quote, &[id]).await
    }

    /// Add a storage to a quote
    #[instrument(skip(self, edition), fields(name = %edition.name))]
    pub async fn create_storage(
        &self,
        quote_id: Uuid,
        edition: StorageEdition,
    ) -> QuoteResult<UpdatedCost> {
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let id = add_storage(&catalog, &mut quote, &edition)?;
        let updated = self.commit(&mut quote, id).await?;

        info!(
            quote_id = %quote_id,
            resource_id = %id,
            cost = updated.cost.min,
            total = updated.total.min,
            "Storage created"
        );
        Ok(updated)
    }

    /// Replace a storage of a quote
    #[instrument(skip(self, edition), fields(name = %edition.name))]
    pub async fn update_storage(
        &self,
        quote_id: Uuid,
        id: Uuid,
        edition: StorageEdition,
    ) -> QuoteResult<UpdatedCost> {
        edition.validate()?;
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let ctx = quote.storage_context(&edition.requirements());
        let price = storage_price_for(&catalog, &ctx, &edition)?;
        quote.update_storage(id, &edition, price)?;
        let updated = self.commit(&mut quote, id).await?;

        info!(
            quote_id = %quote_id,
            resource_id = %id,
            cost = updated.cost.min,
            total = updated.total.min,
            "Storage updated"
        );
        Ok(updated)
    }

    /// Remove a storage
    #[instrument(skip(self))]
    pub async fn delete_storage(&self, quote_id: Uuid, id: Uuid) -> QuoteResult<FloatingCost> {
        let quote = self.load_quote(quote_id).await?;
        quote.storage(id)?;
        self.remove(quote, &[id]).await
    }

    /// Remove every storage of a quote
    #[instrument(skip(self))]
    pub async fn delete_all_storages(&self, quote_id: Uuid) -> QuoteResult<FloatingCost> {
        let quote = self.load_quote(quote_id).await?;
        let ids: Vec<Uuid> = quote.live_storages().map(|s| s.id).collect();
        self.remove(quote, &ids).await
    }

    /// Replace the editable attributes of a quote.
    ///
    /// Resources depending on a changed default are recomputed; those whose
    /// price no longer fits, or all of them with `refresh`, are moved to
    /// their cheapest match.
    #[instrument(skip(self, edition))]
    pub async fn update_quote(&self, quote_id: Uuid, edition: QuoteEdition) -> QuoteResult<Quote> {
        edition.validate()?;
        let mut quote = self.load_quote(quote_id).await?;
        if edition.location != quote.location {
            self.ensure_location(&quote.provider, &edition.location).await?;
        }
        let catalog = self.catalog(&quote.provider).await?;

        quote.name = edition.name;
        quote.description = edition.description;
        let mut affected = quote.set_ram_adjusted_rate(edition.ram_adjusted_rate);
        affected.extend(quote.set_default_license(edition.license));
        affected.extend(quote.set_default_usage(edition.usage));
        affected.extend(quote.set_default_location(edition.location));

        let mut seen = std::collections::HashSet::new();
        affected.retain(|id| seen.insert(*id));

        let mut repriced = 0;
        for &id in &affected {
            let changed = match quote.resource_kind(id)? {
                ResourceKind::Instance => {
                    reprice_instance(&catalog, &mut quote, id, edition.refresh)?
                }
                ResourceKind::Storage => {
                    reprice_storage(&catalog, &mut quote, id, edition.refresh)?
                }
            };
            if changed {
                repriced += 1;
            }
        }

        let total = CostEngine::new(&mut quote).recompute_quote_total()?;
        record_total(&quote, total);
        self.quotes.save(&quote).await?;

        info!(
            quote_id = %quote_id,
            affected = affected.len(),
            repriced,
            cost = total.min,
            max_cost = total.max,
            "Quote updated"
        );
        Ok(quote)
    }

    /// Move every resource of a quote to its current cheapest match
    #[instrument(skip(self))]
    pub async fn refresh(&self, quote_id: Uuid) -> QuoteResult<FloatingCost> {
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let instances: Vec<Uuid> = quote.live_instances().map(|i| i.id).collect();
        let storages: Vec<Uuid> = quote.live_storages().map(|s| s.id).collect();
        let mut repriced = 0;
        for id in instances {
            if reprice_instance(&catalog, &mut quote, id, true)? {
                repriced += 1;
            }
        }
        for id in storages {
            if reprice_storage(&catalog, &mut quote, id, true)? {
                repriced += 1;
            }
        }

        let total = CostEngine::new(&mut quote).recompute_quote_total()?;
        record_total(&quote, total);
        self.quotes.save(&quote).await?;

        info!(
            quote_id = %quote_id,
            repriced,
            cost = total.min,
            max_cost = total.max,
            "Quote refreshed"
        );
        Ok(total)
    }

    /// Recompute one resource and the quote aggregate
    #[instrument(skip(self))]
    pub async fn recompute(&self, quote_id: Uuid, id: Uuid) -> QuoteResult<UpdatedCost> {
        let mut quote = self.load_quote(quote_id).await?;
        self.commit(&mut quote, id).await
    }

    /// Recompute the aggregate of a quote
    #[instrument(skip(self))]
    pub async fn recompute_total(&self, quote_id: Uuid) -> QuoteResult<FloatingCost> {
        let mut quote = self.load_quote(quote_id).await?;
        let total = CostEngine::new(&mut quote).recompute_quote_total()?;
        record_total(&quote, total);
        self.quotes.save(&quote).await?;
        Ok(total)
    }

    /// Create many resources with a single aggregate pass.
    ///
    /// A failing entry leaves no resource behind. With
    /// [`BatchPolicy::Abort`] the first failure is returned and nothing is
    /// persisted; with [`BatchPolicy::SkipAndReport`] it is reported and
    /// the batch goes on.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn import(
        &self,
        quote_id: Uuid,
        entries: Vec<ImportEntry>,
        policy: BatchPolicy,
    ) -> QuoteResult<BatchReport> {
        let mut quote = self.load_quote(quote_id).await?;
        let catalog = self.catalog(&quote.provider).await?;

        let mut report = BatchReport::default();
        for (index, entry) in entries.iter().enumerate() {
            let checkpoint = quote.checkpoint();
            match apply_entry(&catalog, &mut quote, entry) {
                Ok(created) => report.created.extend(created),
                Err(e) => {
                    quote.rollback(checkpoint);
                    warn!(index, name = %entry.name(), error = %e, "Import entry failed");
                    if policy == BatchPolicy::Abort {
                        CostingMetrics::record_batch(&policy.to_string(), 0, 1);
                        return Err(e);
                    }
                    report.failures.push(BatchFailure {
                        index,
                        name: entry.name().to_string(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report.total = CostEngine::new(&mut quote).recompute_quote_total()?;
        record_total(&quote, report.total);
        CostingMetrics::record_batch(
            &policy.to_string(),
            report.created.len(),
            report.failures.len(),
        );
        self.quotes.save(&quote).await?;

        info!(
            quote_id = %quote_id,
            created = report.created.len(),
            failed = report.failures.len(),
            cost = report.total.min,
            "Import completed"
        );
        Ok(report)
    }
}
