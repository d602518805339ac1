use std::collections::HashSet;

use ndnfw_core::Name;

/// Names announced by the local routing layer as terminable here. A
/// forwarding hint is stripped once the Interest reaches any listed region.
#[derive(Debug, Default)]
pub struct NetworkRegionTable {
    regions: HashSet<Name>,
}

impl NetworkRegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, region: Name) {
        self.regions.insert(region);
    }

    pub fn remove(&mut self, region: &Name) -> bool {
        self.regions.remove(region)
    }

    /// Does any delegation in the forwarding hint point into a region this
    /// router belongs to? A region matches when a region name is a prefix of
    /// the delegation name.
    pub fn is_in_producer_region(&self, forwarding_hint: &[Name]) -> bool {
        forwarding_hint
            .iter()
            .any(|hint| self.regions.iter().any(|region| region.is_prefix_of(hint)))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
