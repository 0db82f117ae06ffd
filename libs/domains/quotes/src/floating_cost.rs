//! Cost ranges `{min, max, unbound}`.
//!
//! A resource with an open-ended quantity reports its minimal committed cost
//! as both bounds and raises `unbound`, so totals built from it are floors
//! rather than ceilings.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use domain_catalog::round_cost;
use serde::{Deserialize, Serialize};

/// A monthly cost range
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloatingCost {
    pub min: f64,
    pub max: f64,
    /// The upper bound is not determinable
    pub unbound: bool,
}

impl FloatingCost {
    pub const fn new(min: f64, max: f64, unbound: bool) -> Self {
        Self { min, max, unbound }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, false)
    }

    /// A bounded cost with no spread
    pub const fn fixed(value: f64) -> Self {
        Self::new(value, value, false)
    }

    /// Scale a unit cost by quantity bounds. `None` as maximum means
    /// unbounded scale-out.
    pub fn from_quantity(unit_cost: f64, min_quantity: u32, max_quantity: Option<u32>) -> Self {
        let min = unit_cost * f64::from(min_quantity);
        match max_quantity {
            Some(max) => Self::new(min, unit_cost * f64::from(max), false),
            None => Self::new(min, min, true),
        }
    }

    /// Multiply both bounds, `unbound` is kept
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.min * factor, self.max * factor, self.unbound)
    }

    /// Round both bounds half-up to the stored precision
    pub fn round(self) -> Self {
        Self::new(round_cost(self.min), round_cost(self.max), self.unbound)
    }

    pub fn is_zero(&self) -> bool {
        self.min == 0.0 && self.max == 0.0 && !self.unbound
    }
}

impl Add for FloatingCost {
    type Output = FloatingCost;

    fn add(self, other: FloatingCost) -> FloatingCost {
        FloatingCost::new(
            self.min + other.min,
            self.max + other.max,
            self.unbound || other.unbound,
        )
    }
}

impl AddAssign for FloatingCost {
    fn add_assign(&mut self, other: FloatingCost) {
        *self = *self + other;
    }
}

impl Sum for FloatingCost {
    fn sum<I: Iterator<Item = FloatingCost>>(iter: I) -> Self {
        iter.fold(FloatingCost::zero(), Add::add)
    }
}

impl<'a> Sum<&'a FloatingCost> for FloatingCost {
    fn sum<I: Iterator<Item = &'a FloatingCost>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
