//! Resource bookkeeping on the quote aggregate: lookups, attachment checks
//! and the invalidation rules that mark resources stale.

use std::collections::HashSet;

use domain_catalog::{InstancePrice, LookupContext, StoragePrice, StorageRequirements, Usage};
use uuid::Uuid;

use crate::costed::Costed;
use crate::error::{QuoteError, QuoteResult};
use crate::models::{
    InstanceEdition, QuantityBounds, Quote, QuotedInstance, QuotedStorage, ResourceKind,
    StorageEdition,
};

/// Resource counts of a quote, to undo appends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    instances: usize,
    storages: usize,
}

impl Quote {
    /// Quote-level values every lookup of this quote depends on
    pub fn lookup_context(&self) -> LookupContext {
        LookupContext {
            default_location: self.location.clone(),
            default_license: self.license.clone(),
            ram_adjusted_rate: self.ram_adjusted_rate,
            default_usage: self.usage.clone(),
        }
    }

    /// Lookup context of a storage. An attached storage without its own
    /// location defaults to the location of its host.
    pub fn storage_context(&self, requirements: &StorageRequirements) -> LookupContext {
        let ctx = self.lookup_context();
        match requirements.instance.and_then(|id| self.find_instance(id)) {
            Some(host) => {
                let location = host.requirements.resolved_location(&ctx).to_string();
                ctx.with_location(location)
            }
            None => ctx,
        }
    }

    fn find_instance(&self, id: Uuid) -> Option<&QuotedInstance> {
        self.instances.iter().find(|i| i.id == id && i.is_live())
    }

    fn find_storage(&self, id: Uuid) -> Option<&QuotedStorage> {
        self.storages.iter().find(|s| s.id == id && s.is_live())
    }

    pub fn instance(&self, id: Uuid) -> QuoteResult<&QuotedInstance> {
        self.find_instance(id)
            .ok_or_else(|| QuoteError::NotFound(format!("instance {id}")))
    }

    pub fn instance_mut(&mut self, id: Uuid) -> QuoteResult<&mut QuotedInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.id == id && i.is_live())
            .ok_or_else(|| QuoteError::NotFound(format!("instance {id}")))
    }

    pub fn storage(&self, id: Uuid) -> QuoteResult<&QuotedStorage> {
        self.find_storage(id)
            .ok_or_else(|| QuoteError::NotFound(format!("storage {id}")))
    }

    pub fn storage_mut(&mut self, id: Uuid) -> QuoteResult<&mut QuotedStorage> {
        self.storages
            .iter_mut()
            .find(|s| s.id == id && s.is_live())
            .ok_or_else(|| QuoteError::NotFound(format!("storage {id}")))
    }

    /// Kind of a live resource
    pub fn resource_kind(&self, id: Uuid) -> QuoteResult<ResourceKind> {
        if self.find_instance(id).is_some() {
            Ok(ResourceKind::Instance)
        } else if self.find_storage(id).is_some() {
            Ok(ResourceKind::Storage)
        } else {
            Err(QuoteError::NotFound(format!("resource {id}")))
        }
    }

    pub fn live_instances(&self) -> impl Iterator<Item = &QuotedInstance> {
        self.instances.iter().filter(|i| i.is_live())
    }

    pub fn live_storages(&self) -> impl Iterator<Item = &QuotedStorage> {
        self.storages.iter().filter(|s| s.is_live())
    }

    pub fn live_resource_count(&self) -> usize {
        self.live_instances().count() + self.live_storages().count()
    }

    /// Live storages attached to an instance
    pub fn attached_storage_ids(&self, instance: Uuid) -> Vec<Uuid> {
        self.live_storages()
            .filter(|s| s.instance() == Some(instance))
            .map(|s| s.id)
            .collect()
    }

    /// Quantity bounds applied to a storage: its own, multiplied by its
    /// host's when attached
    pub fn storage_quantity(&self, storage: &QuotedStorage) -> QuoteResult<QuantityBounds> {
        match storage.instance() {
            None => Ok(storage.quantity),
            Some(host_id) => match self.find_instance(host_id) {
                Some(host) => Ok(storage.quantity.times(host.quantity)),
                None => Err(QuoteError::IncompatibleRequirements {
                    resource: storage.name.clone(),
                    field: "instance".to_string(),
                    type_name: storage.price.storage_type.name.clone(),
                    detail: format!("instance {host_id} is not part of the quote"),
                }),
            },
        }
    }

    /// Next resource on the attachment chain
    fn host_of(&self, id: Uuid) -> Option<Uuid> {
        self.storages
            .iter()
            .find(|s| s.id == id)
            .and_then(QuotedStorage::instance)
    }

    /// Check that `resource` may be attached to `target`: the host chain of
    /// `target` never reaches `resource`, and `target` is a live instance
    pub fn ensure_attachable(&self, resource: Uuid, target: Uuid) -> QuoteResult<()> {
        let mut visited = HashSet::new();
        let mut current = Some(target);
        while let Some(id) = current {
            if id == resource || !visited.insert(id) {
                return Err(QuoteError::AttachmentCycle { resource, target });
            }
            current = self.host_of(id);
        }

        match self.resource_kind(target) {
            Ok(ResourceKind::Instance) => Ok(()),
            Ok(ResourceKind::Storage) => Err(QuoteError::InvalidAttachment { resource, target }),
            Err(_) => Err(QuoteError::NotFound(format!("instance {target}"))),
        }
    }

    pub fn push_instance(&mut self, instance: QuotedInstance) -> Uuid {
        let id = instance.id;
        self.instances.push(instance);
        id
    }

    pub fn push_storage(&mut self, storage: QuotedStorage) -> QuoteResult<Uuid> {
        if let Some(target) = storage.instance() {
            self.ensure_attachable(storage.id, target)?;
        }
        let id = storage.id;
        self.storages.push(storage);
        Ok(id)
    }

    /// Replace the editable attributes and the price of an instance
    pub fn update_instance(
        &mut self,
        id: Uuid,
        edition: &InstanceEdition,
        price: InstancePrice,
    ) -> QuoteResult<()> {
        let instance = self.instance_mut(id)?;
        let requirements = edition.requirements();
        let quantity = edition.quantity();
        let cascade = instance.quantity != quantity
            || instance.requirements.location != requirements.location
            || instance.price.id != price.id;

        instance.name = edition.name.clone();
        instance.description = edition.description.clone();
        instance.requirements = requirements;
        instance.quantity = quantity;
        instance.set_price(price);

        if cascade {
            self.mark_attached_stale(id);
        }
        Ok(())
    }

    /// Replace the editable attributes and the price of a storage
    pub fn update_storage(
        &mut self,
        id: Uuid,
        edition: &StorageEdition,
        price: StoragePrice,
    ) -> QuoteResult<()> {
        self.storage(id)?;
        if let Some(target) = edition.instance {
            self.ensure_attachable(id, target)?;
        }

        let storage = self.storage_mut(id)?;
        storage.name = edition.name.clone();
        storage.description = edition.description.clone();
        storage.requirements = edition.requirements();
        storage.quantity = edition.quantity();
        storage.set_price(price);
        Ok(())
    }

    pub fn set_instance_price(&mut self, id: Uuid, price: InstancePrice) -> QuoteResult<()> {
        self.instance_mut(id)?.set_price(price);
        self.mark_attached_stale(id);
        Ok(())
    }

    pub fn set_storage_price(&mut self, id: Uuid, price: StoragePrice) -> QuoteResult<()> {
        self.storage_mut(id)?.set_price(price);
        Ok(())
    }

    fn mark_attached_stale(&mut self, instance: Uuid) -> Vec<Uuid> {
        self.storages
            .iter_mut()
            .filter(|s| s.is_live() && s.instance() == Some(instance))
            .map(|s| {
                s.mark_stale();
                s.id
            })
            .collect()
    }

    /// Change the RAM adjusted rate. Returns the affected instances.
    pub fn set_ram_adjusted_rate(&mut self, rate: u32) -> Vec<Uuid> {
        if self.ram_adjusted_rate == rate {
            return Vec::new();
        }
        self.ram_adjusted_rate = rate;
        self.instances
            .iter_mut()
            .filter(|i| i.is_live())
            .map(|i| {
                i.mark_stale();
                i.id
            })
            .collect()
    }

    /// Change the default license. Returns the affected instances, those
    /// without a license of their own.
    pub fn set_default_license(&mut self, license: Option<String>) -> Vec<Uuid> {
        if self.license == license {
            return Vec::new();
        }
        self.license = license;
        self.instances
            .iter_mut()
            .filter(|i| i.is_live() && i.requirements.license.is_none())
            .map(|i| {
                i.mark_stale();
                i.id
            })
            .collect()
    }

    /// Change the default usage. Returns the affected instances, those
    /// without a usage of their own.
    pub fn set_default_usage(&mut self, usage: Option<Usage>) -> Vec<Uuid> {
        if self.usage == usage {
            return Vec::new();
        }
        self.usage = usage;
        self.instances
            .iter_mut()
            .filter(|i| i.is_live() && i.requirements.usage.is_none())
            .map(|i| {
                i.mark_stale();
                i.id
            })
            .collect()
    }

    /// Change the default location. Returns the affected resources: those
    /// without a location of their own, a storage being affected only when
    /// it is unattached or its host is.
    pub fn set_default_location(&mut self, location: String) -> Vec<Uuid> {
        if self.location == location {
            return Vec::new();
        }
        self.location = location;

        let mut affected: Vec<Uuid> = self
            .instances
            .iter_mut()
            .filter(|i| i.is_live() && i.requirements.location.is_none())
            .map(|i| {
                i.mark_stale();
                i.id
            })
            .collect();
        let hosts: HashSet<Uuid> = affected.iter().copied().collect();

        for storage in self.storages.iter_mut().filter(|s| s.is_live()) {
            let follows_quote = storage.requirements.location.is_none()
                && storage.instance().is_none_or(|host| hosts.contains(&host));
            if follows_quote {
                storage.mark_stale();
                affected.push(storage.id);
            }
        }
        affected
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            instances: self.instances.len(),
            storages: self.storages.len(),
        }
    }

    /// Drop the resources appended since the checkpoint. Changes made to
    /// resources that existed before it are kept.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.instances.truncate(checkpoint.instances);
        self.storages.truncate(checkpoint.storages);
    }

    /// Physically drop removed resources. Returns their ids.
    pub fn purge_removed(&mut self) -> Vec<Uuid> {
        let mut purged = Vec::new();
        self.instances.retain(|i| {
            let live = i.is_live();
            if !live {
                purged.push(i.id);
            }
            live
        });
        self.storages.retain(|s| {
            let live = s.is_live();
            if !live {
                purged.push(s.id);
            }
            live
        });
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateQuote, ResourceState};
    use test_utils::fixtures::{self, REGION, REGION_2};

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

    fn add_instance(quote: &mut Quote, name: &str) -> Uuid {
        let catalog = fixtures::sample_catalog();
        let mut instance = QuotedInstance::new(
            &InstanceEdition::new(name, 0.5, 2000),
            fixtures::instance_price(&catalog, "C2"),
        );
        instance.state = ResourceState::Priced;
        quote.push_instance(instance)
    }

    fn add_storage(quote: &mut Quote, name: &str, host: Option<Uuid>) -> Uuid {
        let catalog = fixtures::sample_catalog();
        let mut edition = StorageEdition::new(name, 20);
        edition.instance = host;
        let mut storage = QuotedStorage::new(&edition, fixtures::storage_price(&catalog, "S1"));
        storage.state = ResourceState::Priced;
        quote.push_storage(storage).unwrap()
    }

    #[test]
    fn test_self_attachment_is_a_cycle() {
        let mut quote = quote();
        let storage = add_storage(&mut quote, "data", None);
        let result = quote.ensure_attachable(storage, storage);
        assert!(matches!(result, Err(QuoteError::AttachmentCycle { .. })));
    }

    #[test]
    fn test_attaching_to_storage_is_rejected() {
        let mut quote = quote();
        let host = add_instance(&mut quote, "web");
        let attached = add_storage(&mut quote, "root", Some(host));
        let other = add_storage(&mut quote, "data", None);

        let result = quote.ensure_attachable(other, attached);
        assert!(matches!(result, Err(QuoteError::InvalidAttachment { .. })));
        assert!(quote.ensure_attachable(other, host).is_ok());
    }

    #[test]
    fn test_attaching_to_unknown_instance() {
        let mut quote = quote();
        let storage = add_storage(&mut quote, "data", None);
        let result = quote.ensure_attachable(storage, Uuid::now_v7());
        assert!(matches!(result, Err(QuoteError::NotFound(_))));
    }

    #[test]
    fn test_attached_storage_quantity_follows_host() {
        let mut quote = quote();
        let host = add_instance(&mut quote, "web");
        quote.instance_mut(host).unwrap().quantity = QuantityBounds::new(2, Some(10));
        let storage = add_storage(&mut quote, "root", Some(host));

        let storage = quote.storage(storage).unwrap();
        assert_eq!(
            quote.storage_quantity(storage).unwrap(),
            QuantityBounds::new(2, Some(10))
        );
    }

    #[test]
    fn test_storage_context_uses_host_location() {
        let mut quote = quote();
        let host = add_instance(&mut quote, "web");
        quote.instance_mut(host).unwrap().requirements.location = Some(REGION_2.to_string());

        let mut attached = StorageEdition::new("root", 20).requirements();
        attached.instance = Some(host);
        assert_eq!(quote.storage_context(&attached).default_location, REGION_2);

        let detached = StorageEdition::new("data", 20).requirements();
        assert_eq!(quote.storage_context(&detached).default_location, REGION);
    }

    #[test]
    fn test_ram_rate_marks_instances_stale() {
        let mut quote = quote();
        let instance = add_instance(&mut quote, "web");
        let storage = add_storage(&mut quote, "data", None);

        assert!(quote.set_ram_adjusted_rate(100).is_empty());
        assert_eq!(quote.set_ram_adjusted_rate(150), vec![instance]);
        assert_eq!(quote.instance(instance).unwrap().state, ResourceState::Stale);
        assert_eq!(quote.storage(storage).unwrap().state, ResourceState::Priced);
    }

    #[test]
    fn test_license_affects_instances_without_own_license() {
        let mut quote = quote();
        let follows = add_instance(&mut quote, "web");
        let pinned = add_instance(&mut quote, "db");
        quote.instance_mut(pinned).unwrap().requirements.license = Some("BYOL".to_string());

        assert_eq!(quote.set_default_license(Some("BYOL".to_string())), vec![follows]);
        assert_eq!(quote.instance(pinned).unwrap().state, ResourceState::Priced);
    }

    #[test]
    fn test_location_cascades_to_attached_storages() {
        let mut quote = quote();
        let follows = add_instance(&mut quote, "web");
        let pinned = add_instance(&mut quote, "db");
        quote.instance_mut(pinned).unwrap().requirements.location = Some(REGION.to_string());
        let on_follows = add_storage(&mut quote, "root", Some(follows));
        let on_pinned = add_storage(&mut quote, "db-root", Some(pinned));
        let detached = add_storage(&mut quote, "backup", None);

        let affected = quote.set_default_location(REGION_2.to_string());
        assert_eq!(affected, vec![follows, on_follows, detached]);
        assert_eq!(quote.storage(on_pinned).unwrap().state, ResourceState::Priced);
    }

    #[test]
    fn test_quantity_change_marks_attached_storages_stale() {
        let mut quote = quote();
        let host = add_instance(&mut quote, "web");
        let attached = add_storage(&mut quote, "root", Some(host));
        let price = quote.instance(host).unwrap().price.clone();

        let mut edition = InstanceEdition::new("web", 0.5, 2000);
        edition.max_quantity = Some(4);
        quote.update_instance(host, &edition, price).unwrap();

        assert_eq!(quote.instance(host).unwrap().state, ResourceState::Stale);
        assert_eq!(quote.storage(attached).unwrap().state, ResourceState::Stale);
    }

    #[test]
    fn test_update_storage_moves_to_another_host() {
        let mut quote = quote();
        let web = add_instance(&mut quote, "web");
        let db = add_instance(&mut quote, "db");
        let data = add_storage(&mut quote, "data", Some(web));
        let price = quote.storage(data).unwrap().price.clone();

        let mut edition = StorageEdition::new("data", 50);
        edition.instance = Some(db);
        quote.update_storage(data, &edition, price).unwrap();

        let storage = quote.storage(data).unwrap();
        assert_eq!(storage.instance(), Some(db));
        assert_eq!(storage.requirements.size_gb, 50);
        assert_eq!(storage.state, ResourceState::Stale);
        assert!(quote.attached_storage_ids(web).is_empty());
        assert_eq!(quote.attached_storage_ids(db), vec![data]);
    }

    #[test]
    fn test_rejected_storage_edit_keeps_storage() {
        let mut quote = quote();
        let web = add_instance(&mut quote, "web");
        let root = add_storage(&mut quote, "root", Some(web));
        let data = add_storage(&mut quote, "data", None);
        let price = quote.storage(data).unwrap().price.clone();

        let mut edition = StorageEdition::new("renamed", 80);
        edition.instance = Some(root);
        let result = quote.update_storage(data, &edition, price.clone());
        assert!(matches!(result, Err(QuoteError::InvalidAttachment { .. })));

        edition.instance = Some(data);
        let result = quote.update_storage(data, &edition, price);
        assert!(matches!(result, Err(QuoteError::AttachmentCycle { .. })));

        let storage = quote.storage(data).unwrap();
        assert_eq!(storage.name, "data");
        assert_eq!(storage.instance(), None);
        assert_eq!(storage.state, ResourceState::Priced);
    }

    #[test]
    fn test_rollback_and_purge() {
        let mut quote = quote();
        let kept = add_instance(&mut quote, "web");
        let checkpoint = quote.checkpoint();
        add_instance(&mut quote, "tmp");
        add_storage(&mut quote, "tmp-data", None);
        quote.rollback(checkpoint);
        assert_eq!(quote.instances.len(), 1);
        assert!(quote.storages.is_empty());

        quote.instance_mut(kept).unwrap().mark_removed();
        assert!(matches!(quote.instance(kept), Err(QuoteError::NotFound(_))));
        assert_eq!(quote.purge_removed(), vec![kept]);
        assert!(quote.instances.is_empty());
    }
}
