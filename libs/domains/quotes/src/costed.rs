//! Shared view of a quoted resource for the propagation engine. Each kind
//! supplies its own predicate and unit cost formula.

use domain_catalog::{
    CatalogPrice, InstancePrice, LookupContext, RequirementMismatch, StoragePrice,
};
use uuid::Uuid;

use crate::floating_cost::FloatingCost;
use crate::models::{QuantityBounds, QuotedInstance, QuotedStorage, ResourceKind, ResourceState};

pub trait Costed {
    type Price: CatalogPrice;

    const KIND: ResourceKind;

    fn id(&self) -> Uuid;

    fn name(&self) -> &str;

    fn price(&self) -> &Self::Price;

    /// Replace the resolved price; the stored cost becomes stale
    fn set_price(&mut self, price: Self::Price);

    /// Own quantity bounds, before any attachment scaling
    fn quantity(&self) -> QuantityBounds;

    fn state(&self) -> ResourceState;

    fn set_state(&mut self, state: ResourceState);

    /// Stored cost range
    fn stored_cost(&self) -> FloatingCost;

    /// Write the cost fields, rounded, and mark the resource priced
    fn store_cost(&mut self, cost: FloatingCost) -> FloatingCost;

    /// Stored one-time cost range
    fn stored_initial_cost(&self) -> FloatingCost;

    /// Write the one-time cost fields, rounded
    fn store_initial_cost(&mut self, cost: FloatingCost) -> FloatingCost;

    /// Check the resolved price against the current requirements
    fn revalidate(&self, ctx: &LookupContext) -> Result<(), RequirementMismatch>;

    /// Monthly cost of one unit at the requested size
    fn unit_cost(&self, ctx: &LookupContext) -> f64;

    /// Priced becomes stale; other states are kept
    fn mark_stale(&mut self) {
        if self.state() == ResourceState::Priced {
            self.set_state(ResourceState::Stale);
        }
    }

    /// Zero the contribution and wait for deletion
    fn mark_removed(&mut self) {
        self.store_cost(FloatingCost::zero());
        self.store_initial_cost(FloatingCost::zero());
        self.set_state(ResourceState::Removed);
    }

    fn is_live(&self) -> bool {
        self.state() != ResourceState::Removed
    }
}

impl Costed for QuotedInstance {
    type Price = InstancePrice;

    const KIND: ResourceKind = ResourceKind::Instance;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn price(&self) -> &InstancePrice {
        &self.price
    }

    fn set_price(&mut self, price: InstancePrice) {
        self.price = price;
        self.mark_stale();
    }

    fn quantity(&self) -> QuantityBounds {
        self.quantity
    }

    fn state(&self) -> ResourceState {
        self.state
    }

    fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    fn stored_cost(&self) -> FloatingCost {
        FloatingCost::new(self.cost, self.max_cost, self.unbound_cost)
    }

    fn store_cost(&mut self, cost: FloatingCost) -> FloatingCost {
        let cost = cost.round();
        self.cost = cost.min;
        self.max_cost = cost.max;
        self.unbound_cost = cost.unbound;
        self.state = ResourceState::Priced;
        cost
    }

    fn stored_initial_cost(&self) -> FloatingCost {
        FloatingCost::new(self.initial_cost, self.max_initial_cost, self.unbound_cost)
    }

    fn store_initial_cost(&mut self, cost: FloatingCost) -> FloatingCost {
        let cost = cost.round();
        self.initial_cost = cost.min;
        self.max_initial_cost = cost.max;
        cost
    }

    fn revalidate(&self, ctx: &LookupContext) -> Result<(), RequirementMismatch> {
        self.requirements.accepts(&self.price, ctx)
    }

    fn unit_cost(&self, ctx: &LookupContext) -> f64 {
        self.requirements.unit_cost(&self.price, ctx)
    }
}

impl Costed for QuotedStorage {
    type Price = StoragePrice;

    const KIND: ResourceKind = ResourceKind::Storage;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn price(&self) -> &StoragePrice {
        &self.price
    }

    fn set_price(&mut self, price: StoragePrice) {
        self.price = price;
        self.mark_stale();
    }

    fn quantity(&self) -> QuantityBounds {
        self.quantity
    }

    fn state(&self) -> ResourceState {
        self.state
    }

    fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    fn stored_cost(&self) -> FloatingCost {
        FloatingCost::new(self.cost, self.max_cost, self.unbound_cost)
    }

    fn store_cost(&mut self, cost: FloatingCost) -> FloatingCost {
        let cost = cost.round();
        self.cost = cost.min;
        self.max_cost = cost.max;
        self.unbound_cost = cost.unbound;
        self.state = ResourceState::Priced;
        cost
    }

    fn stored_initial_cost(&self) -> FloatingCost {
        FloatingCost::new(self.initial_cost, self.max_initial_cost, self.unbound_cost)
    }

    fn store_initial_cost(&mut self, cost: FloatingCost) -> FloatingCost {
        let cost = cost.round();
        self.initial_cost = cost.min;
        self.max_initial_cost = cost.max;
        cost
    }

    fn revalidate(&self, ctx: &LookupContext) -> Result<(), RequirementMismatch> {
        self.requirements.accepts(&self.price, ctx)
    }

    fn unit_cost(&self, _ctx: &LookupContext) -> f64 {
        self.requirements.unit_cost(&self.price)
    }
}
