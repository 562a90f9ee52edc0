//! Maps ecoinvent locations to IAM regions through a containment lattice,
//! represented as a petgraph digraph where edges point from a container to
//! the locations it contains.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use tracing::warn;

/// A deterministic tie-break: when `a` and `b` both contain a leaf location,
/// prefer `winner`.
#[derive(Debug, Clone)]
pub struct TieBreak {
    pub a: String,
    pub b: String,
    pub winner: String,
}

/// The geographic containment lattice mapping ecoinvent locations to IAM
/// regions and back.
///
/// Contract: pure function after [`GeoResolver::new`]/[`GeoResolver::insert`]
/// calls finish — once queries begin, the lattice never mutates.
pub struct GeoResolver {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    iam_regions: HashSet<String>,
    tie_breaks: Vec<TieBreak>,
}

impl Default for GeoResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoResolver {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for root in ["GLO", "RoW"] {
            let idx = graph.add_node(root.to_string());
            index.insert(root.to_string(), idx);
        }
        Self {
            graph,
            index,
            iam_regions: HashSet::new(),
            tie_breaks: Vec::new(),
        }
    }

    fn node(&mut self, loc: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(loc) {
            return *idx;
        }
        let idx = self.graph.add_node(loc.to_string());
        self.index.insert(loc.to_string(), idx);
        idx
    }

    /// Declare that `parent` contains `child` (e.g. `RER` contains `DE`).
    pub fn insert(&mut self, parent: &str, child: &str) {
        let p = self.node(parent);
        let c = self.node(child);
        self.graph.update_edge(p, c, ());
    }

    /// Register `region` as one of the scenario's IAM regions (including `World`).
    pub fn register_iam_region(&mut self, region: &str) {
        self.node(region);
        self.iam_regions.insert(region.to_string());
    }

    pub fn add_tie_break(&mut self, a: &str, b: &str, winner: &str) {
        self.tie_breaks.push(TieBreak {
            a: a.to_string(),
            b: b.to_string(),
            winner: winner.to_string(),
        });
    }

    pub fn is_iam_region(&self, loc: &str) -> bool {
        self.iam_regions.contains(loc)
    }

    /// Build a representative lattice covering ecoinvent's common aggregates,
    /// a handful of IAM regions (REMIND-style 8-region split), and enough
    /// leaf countries to exercise the allocation/relinking algorithms.
    pub fn with_default_lattice() -> Self {
        let mut geo = Self::new();
        for region in ["World", "EUR", "USA", "CHA", "IND", "OAS", "JPN", "CAZ", "AFR", "MEA", "REF", "LAM"] {
            geo.register_iam_region(region);
        }
        geo.insert("World", "GLO");
        for r in ["EUR", "USA", "CHA", "IND", "OAS", "JPN", "CAZ", "AFR", "MEA", "REF", "LAM"] {
            geo.insert("World", r);
        }

        geo.insert("EUR", "RER");
        geo.insert("EUR", "Europe without Switzerland");
        geo.insert("EUR", "NEU");
        geo.insert("RER", "Europe without Switzerland");
        for c in ["DE", "FR", "IT", "ES", "PL", "NL", "BE", "AT", "SE"] {
            geo.insert("RER", c);
            geo.insert("Europe without Switzerland", c);
        }
        geo.insert("NEU", "CH");
        geo.insert("NEU", "NO");

        geo.insert("REF", "IAI Area, Russia & RER w/o EU27 & EFTA");
        geo.insert("REF", "RU");
        geo.insert("REF", "UA");
        geo.insert("EUR", "IAI Area, Russia & RER w/o EU27 & EFTA");

        geo.insert("USA", "US");
        geo.insert("CAZ", "CA");
        geo.insert("CAZ", "AU");
        geo.insert("CAZ", "NZ");

        geo.insert("CHA", "CN");
        geo.insert("IND", "IN");
        geo.insert("JPN", "JP");

        geo.insert("OAS", "ID");
        geo.insert("OAS", "TH");
        geo.insert("OAS", "KR");
        geo.insert("OAS", "MY");
        // OAS intersects with several other regions in ecoinvent's coarser
        // aggregates; tie-break priorities below resolve ambiguity.
        geo.insert("IND", "IN");
        geo.insert("JPN", "JP");

        geo.insert("AFR", "ZA");
        geo.insert("AFR", "NG");
        geo.insert("AFR", "EG");
        geo.insert("MEA", "SA");
        geo.insert("MEA", "AE");
        geo.insert("MEA", "EG");

        geo.insert("LAM", "BR");
        geo.insert("LAM", "MX");
        geo.insert("LAM", "AR");

        geo.insert("IAI Area, Asia, without China and GCC", "ID");
        geo.insert("IAI Area, Asia, without China and GCC", "TH");
        geo.insert("OAS", "IAI Area, Asia, without China and GCC");

        geo.add_tie_break("EUR", "NEU", "EUR");
        geo.add_tie_break("EUR", "REF", "EUR");
        geo.add_tie_break("OAS", "CHA", "OAS");
        geo.add_tie_break("OAS", "IND", "OAS");
        geo.add_tie_break("OAS", "JPN", "OAS");
        geo.add_tie_break("OAS", "MEA", "OAS");
        geo.add_tie_break("OAS", "REF", "OAS");
        geo.add_tie_break("AFR", "MEA", "AFR");
        geo.add_tie_break("USA", "CAZ", "USA");

        geo
    }

    /// Ancestors of `loc`, nearest first, ending at a root (`GLO`/`RoW`).
    /// Unknown locations fall back to a single-hop `GLO` ancestor with a
    /// logged warning.
    pub fn within(&self, loc: &str) -> Vec<String> {
        let Some(&start) = self.index.get(loc) else {
            warn!(location = loc, "unknown location in geographic lattice, falling back to GLO");
            return vec!["GLO".to_string()];
        };
        let mut seen = HashSet::new();
        let mut frontier = vec![start];
        let mut ancestors = Vec::new();
        seen.insert(start);
        while let Some(node) = frontier.pop() {
            for parent in self.graph.neighbors_directed(node, Direction::Incoming) {
                if seen.insert(parent) {
                    ancestors.push(self.graph[parent].clone());
                    frontier.push(parent);
                }
            }
        }
        ancestors
    }

    /// All leaf/aggregate ecoinvent locations strictly within IAM region `r`,
    /// in deterministic (insertion) order, excluding `r` itself and `GLO`
    /// (the `World` aggregate is the one exception, since it legitimately
    /// resolves to `GLO`).
    pub fn iam_to_eco(&self, region: &str) -> Vec<String> {
        if region == "World" {
            return vec!["GLO".to_string()];
        }
        let Some(&start) = self.index.get(region) else {
            warn!(region, "unknown IAM region, returning empty ecoinvent set");
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(node) = stack.pop() {
            let mut children: Vec<_> = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect();
            children.sort_by_key(|n| n.index());
            for child in children {
                if seen.insert(child) {
                    let name = self.graph[child].clone();
                    if name != "GLO" {
                        result.push(name);
                    }
                    stack.push(child);
                }
            }
        }
        result
    }

    /// Raw set of IAM regions whose `iam_to_eco` set contains `loc` (i.e. all
    /// ancestors of `loc` that are registered IAM regions).
    pub fn eco_to_iam_candidates(&self, loc: &str) -> Vec<String> {
        self.within(loc)
            .into_iter()
            .filter(|a| self.iam_regions.contains(a))
            .collect()
    }

    /// Resolve `loc` to exactly one IAM region, applying the deterministic
    /// tie-break table when more than one candidate matches. Falls back to
    /// `World` (logged) when no candidate is found.
    pub fn eco_to_iam(&self, loc: &str) -> String {
        let mut candidates = self.eco_to_iam_candidates(loc);
        if candidates.is_empty() {
            warn!(location = loc, "no IAM region contains this location, falling back to World");
            return "World".to_string();
        }
        if candidates.len() == 1 {
            return candidates.remove(0);
        }
        for tie in &self.tie_breaks {
            let has_a = candidates.iter().any(|c| c == &tie.a);
            let has_b = candidates.iter().any(|c| c == &tie.b);
            if has_a && has_b {
                candidates.retain(|c| c != &tie.a && c != &tie.b || c == &tie.winner);
                if candidates.iter().any(|c| c == &tie.winner) {
                    return tie.winner.clone();
                }
            }
        }
        candidates.sort();
        candidates.into_iter().next().unwrap()
    }

    /// True iff `child` is contained (directly or transitively) within `parent`.
    pub fn contains(&self, parent: &str, child: &str) -> bool {
        if parent == child {
            return true;
        }
        self.within(child).iter().any(|a| a == parent)
    }

    /// True iff the leaf sets of `a` and `b` overlap.
    pub fn intersects(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let leaves_a: HashSet<_> = self.iam_to_eco(a).into_iter().collect();
        let leaves_b: HashSet<_> = self.iam_to_eco(b).into_iter().collect();
        if leaves_a.is_empty() || leaves_b.is_empty() {
            return self.contains(a, b) || self.contains(b, a);
        }
        !leaves_a.is_disjoint(&leaves_b)
    }
}
