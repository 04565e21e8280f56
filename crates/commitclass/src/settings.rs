//! Commit settings resolved for one node

use crate::quantity::Quantity;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-resource scale factors for a node
///
/// Resources without an entry are implicitly scaled to 100% of their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Settings {
    scales: BTreeMap<String, f64>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a percentage for a resource, replacing any earlier entry
    pub(crate) fn set(&mut self, name: &str, percent: i32) {
        let factor = f64::from(percent) / 100.0;
        self.scales.insert(name.to_string(), factor);
    }

    /// Scale factor for a resource, if one was resolved
    pub fn factor(&self, name: &str) -> Option<f64> {
        self.scales.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scales.iter().map(|(name, factor)| (name.as_str(), *factor))
    }

    /// Apply the resource's scale factor to a quantity
    ///
    /// The product is truncated toward zero into the quantity's integer
    /// representation. The result depends on that representation, not only
    /// on the amount: at 25%, `2` scales to `0` while `2000m` scales to `500m`.
    pub fn scale(&self, name: &str, quantity: &Quantity) -> Quantity {
        let mut scaled = *quantity;
        if let Some(factor) = self.factor(name) {
            scaled.set((factor * quantity.value() as f64) as i64);
        }
        scaled
    }
}
