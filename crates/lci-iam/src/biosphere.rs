//! The biosphere flow dictionary contract (I3): every biosphere exchange
//! must reference a flow identity drawn from this fixed vocabulary. The
//! dictionary's own storage format is external; this crate only needs the
//! lookup semantics consumers actually exercise.

use std::collections::HashSet;

use lci_core::BiosphereFlowKey;

pub trait BiosphereDictionary: Send + Sync {
    fn contains(&self, key: &BiosphereFlowKey) -> bool;
    fn resolve_by_name(&self, name: &str, compartment: &str) -> Option<BiosphereFlowKey>;
}

/// An in-memory dictionary sufficient for tests and for callers who seed it
/// programmatically. Production deployments back this with the real
/// biosphere database; only the trait crosses the boundary.
#[derive(Debug, Clone, Default)]
pub struct StaticBiosphereDictionary {
    flows: HashSet<BiosphereFlowKey>,
}

impl StaticBiosphereDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow(mut self, flow: BiosphereFlowKey) -> Self {
        self.flows.insert(flow);
        self
    }

    pub fn insert(&mut self, flow: BiosphereFlowKey) {
        self.flows.insert(flow);
    }

    /// Seeds the fossil/non-fossil CO2 pair the CO2Rebalancer's default case
    /// needs, plus a few other combustion-linked flows the sector recipes
    /// commonly reference.
    pub fn with_default_flows() -> Self {
        let mut dict = Self::new();
        for (name, compartment, sub, unit) in [
            ("Carbon dioxide, fossil", "air", "unspecified", "kilogram"),
            ("Carbon dioxide, non-fossil", "air", "unspecified", "kilogram"),
            ("Carbon monoxide, fossil", "air", "unspecified", "kilogram"),
            ("Carbon monoxide, non-fossil", "air", "unspecified", "kilogram"),
            ("Methane, fossil", "air", "unspecified", "kilogram"),
            ("Sulfur hexafluoride", "air", "unspecified", "kilogram"),
        ] {
            dict.insert(BiosphereFlowKey::new(name, compartment, sub, unit));
        }
        dict
    }
}

impl BiosphereDictionary for StaticBiosphereDictionary {
    fn contains(&self, key: &BiosphereFlowKey) -> bool {
        self.flows.contains(key)
    }

    fn resolve_by_name(&self, name: &str, compartment: &str) -> Option<BiosphereFlowKey> {
        self.flows
            .iter()
            .find(|f| f.name == name && f.compartment == compartment)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flows_contain_co2_pair() {
        let dict = StaticBiosphereDictionary::with_default_flows();
        let fossil = BiosphereFlowKey::new("Carbon dioxide, fossil", "air", "unspecified", "kilogram");
        assert!(dict.contains(&fossil));
        assert!(dict.resolve_by_name("Carbon dioxide, non-fossil", "air").is_some());
        assert!(dict.resolve_by_name("Unknown flow", "air").is_none());
    }
}
