//! Core data model: activities, exchanges, and the identifiers that tie them
//! together without language-level pointer cycles (design note: "arena +
//! stable keys").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable 128-bit identity minted by [`crate::index::ActivityIndex`] when an
/// activity is inserted. Two activities are never confused even if their
/// semantic key briefly collides mid-transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub u128);

impl ActivityId {
    pub fn new(value: u128) -> Self {
        ActivityId(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "act#{:x}", self.0)
    }
}

/// The semantic identity of an activity: any two activities are distinct
/// iff their `(name, reference product, location)` differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityKey {
    pub name: String,
    pub reference_product: String,
    pub location: String,
}

impl ActivityKey {
    pub fn new(
        name: impl Into<String>,
        reference_product: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            reference_product: reference_product.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {}",
            self.name, self.reference_product, self.location
        )
    }
}

/// Identity of an elementary (biosphere) flow: name, compartment,
/// sub-compartment and unit. Resolved against a fixed biosphere dictionary
/// (see `lci-iam::biosphere`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BiosphereFlowKey {
    pub name: String,
    pub compartment: String,
    pub sub_compartment: String,
    pub unit: String,
}

impl BiosphereFlowKey {
    pub fn new(
        name: impl Into<String>,
        compartment: impl Into<String>,
        sub_compartment: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            compartment: compartment.into(),
            sub_compartment: sub_compartment.into(),
            unit: unit.into(),
        }
    }
}

/// A declared uncertainty distribution on an exchange amount, preserved
/// (never propagated/sampled) across copies and rescales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Uncertainty {
    Lognormal { loc: f64, scale: f64 },
    Normal { loc: f64, scale: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { loc: f64, scale: f64, shape: f64 },
}

impl Uncertainty {
    /// Whether the mandatory parameter set for this distribution's type is
    /// complete and finite.
    pub fn is_complete(&self) -> bool {
        match self {
            Uncertainty::Lognormal { loc, scale } | Uncertainty::Normal { loc, scale } => {
                loc.is_finite() && scale.is_finite()
            }
            Uncertainty::Uniform { min, max } => min.is_finite() && max.is_finite() && min <= max,
            Uncertainty::Triangular { loc, scale, shape } => {
                loc.is_finite() && scale.is_finite() && shape.is_finite()
            }
        }
    }
}

/// A value stored in an activity's audit bag (`log_parameters`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// The kind-specific payload of an [`Exchange`] (design note: tagged sums
/// over a single record type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Self-edge: the activity's own reference-quantity output.
    Production {
        product: String,
        production_volume: f64,
    },
    /// A production exchange that is not the activity's primary reference
    /// product.
    GenericProduction { product: String },
    /// Consumption of another activity's product.
    Technosphere {
        product: String,
        location: String,
        /// Resolved once the producer has been matched in this scenario's
        /// output; `None` until `RelinkCache`/`ProxyFabricator` resolve it.
        producer: Option<ActivityId>,
    },
    /// An elementary flow to/from the environment.
    Biosphere { flow: BiosphereFlowKey },
    /// A substitution/credit exchange.
    Substitution {
        product: String,
        location: String,
        producer: Option<ActivityId>,
    },
}

impl ExchangeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ExchangeKind::Production { .. } => "production",
            ExchangeKind::GenericProduction { .. } => "generic production",
            ExchangeKind::Technosphere { .. } => "technosphere",
            ExchangeKind::Biosphere { .. } => "biosphere",
            ExchangeKind::Substitution { .. } => "substitution",
        }
    }

    pub fn product(&self) -> Option<&str> {
        match self {
            ExchangeKind::Production { product, .. }
            | ExchangeKind::GenericProduction { product }
            | ExchangeKind::Technosphere { product, .. }
            | ExchangeKind::Substitution { product, .. } => Some(product),
            ExchangeKind::Biosphere { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            ExchangeKind::Technosphere { location, .. }
            | ExchangeKind::Substitution { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// A typed, amount-carrying edge attached to exactly one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub unit: String,
    pub amount: f64,
    pub uncertainty: Option<Uncertainty>,
    pub kind: ExchangeKind,
}

impl Exchange {
    pub fn production(name: impl Into<String>, product: impl Into<String>, unit: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            amount,
            uncertainty: None,
            kind: ExchangeKind::Production {
                product: product.into(),
                production_volume: 0.0,
            },
        }
    }

    pub fn technosphere(
        name: impl Into<String>,
        product: impl Into<String>,
        location: impl Into<String>,
        unit: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            amount,
            uncertainty: None,
            kind: ExchangeKind::Technosphere {
                product: product.into(),
                location: location.into(),
                producer: None,
            },
        }
    }

    pub fn biosphere(name: impl Into<String>, flow: BiosphereFlowKey, unit: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            amount,
            uncertainty: None,
            kind: ExchangeKind::Biosphere { flow },
        }
    }

    pub fn is_technosphere(&self) -> bool {
        matches!(self.kind, ExchangeKind::Technosphere { .. })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.kind, ExchangeKind::Production { .. })
    }

    pub fn is_biosphere(&self) -> bool {
        matches!(self.kind, ExchangeKind::Biosphere { .. })
    }

    pub fn production_volume(&self) -> Option<f64> {
        match &self.kind {
            ExchangeKind::Production { production_volume, .. } => Some(*production_volume),
            _ => None,
        }
    }

    pub fn set_production_volume(&mut self, pv: f64) {
        if let ExchangeKind::Production { production_volume, .. } = &mut self.kind {
            *production_volume = pv;
        }
    }
}

/// A named production process at a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub reference_product: String,
    pub location: String,
    pub unit: String,
    pub exchanges: Vec<Exchange>,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    #[serde(default)]
    pub classifications: Vec<String>,
    #[serde(default)]
    pub log_parameters: HashMap<String, LogValue>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Names of sectors already applied to this activity; lets a sector
    /// transform check idempotence before reapplying itself.
    #[serde(default)]
    pub applied_sectors: Vec<String>,
}

impl Activity {
    pub fn key(&self) -> ActivityKey {
        ActivityKey::new(&self.name, &self.reference_product, &self.location)
    }

    /// The activity's own production exchange(s) (usually exactly one).
    pub fn production_exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(|e| e.is_production())
    }

    pub fn production_exchanges_mut(&mut self) -> impl Iterator<Item = &mut Exchange> {
        self.exchanges.iter_mut().filter(|e| e.is_production())
    }

    pub fn technosphere_exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(|e| e.is_technosphere())
    }

    pub fn technosphere_exchanges_mut(&mut self) -> impl Iterator<Item = &mut Exchange> {
        self.exchanges.iter_mut().filter(|e| e.is_technosphere())
    }

    pub fn biosphere_exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(|e| e.is_biosphere())
    }

    /// Production volume used as the allocation weight, bounded away from
    /// zero by `eps` so supplier allocation never divides by zero.
    pub fn production_volume(&self, eps: f64) -> f64 {
        self.production_exchanges()
            .filter_map(|e| e.production_volume())
            .next()
            .unwrap_or(0.0)
            .max(eps)
    }

    pub fn has_applied(&self, sector: &str) -> bool {
        self.applied_sectors.iter().any(|s| s == sector)
    }

    pub fn mark_applied(&mut self, sector: impl Into<String>) {
        let sector = sector.into();
        if !self.has_applied(&sector) {
            self.applied_sectors.push(sector);
        }
    }

    pub fn append_comment(&mut self, note: &str) {
        match &mut self.comment {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(note);
            }
            None => self.comment = Some(note.to_string()),
        }
    }
}

/// A set of substrings whose presence in a product name marks it as waste.
/// Matching is case-insensitive substring containment.
pub fn is_waste_product(product: &str) -> bool {
    const WASTE_SUBSTRINGS: &[&str] = &["waste", "spent", "scrap", "sludge", "residue", "slag"];
    let lower = product.to_lowercase();
    WASTE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_key_distinguishes_on_all_three_fields() {
        let a = ActivityKey::new("electricity production", "electricity", "DE");
        let b = ActivityKey::new("electricity production", "electricity", "FR");
        assert_ne!(a, b);
    }

    #[test]
    fn production_volume_floors_at_eps() {
        let mut act = Activity {
            id: ActivityId::new(1),
            name: "x".into(),
            reference_product: "x".into(),
            location: "DE".into(),
            unit: "kg".into(),
            exchanges: vec![Exchange::production("x", "x", "kg", 1.0)],
            parameters: HashMap::new(),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };
        assert_eq!(act.production_volume(1e-9), 1e-9);
        act.production_exchanges_mut().next().unwrap().set_production_volume(42.0);
        assert_eq!(act.production_volume(1e-9), 42.0);
    }

    #[test]
    fn waste_substrings_are_case_insensitive() {
        assert!(is_waste_product("Spent solvent mixture"));
        assert!(is_waste_product("scrap steel"));
        assert!(!is_waste_product("steel, low-alloyed"));
    }

    #[test]
    fn applied_sectors_dedupe() {
        let mut act = Activity {
            id: ActivityId::new(1),
            name: "x".into(),
            reference_product: "x".into(),
            location: "DE".into(),
            unit: "kg".into(),
            exchanges: vec![],
            parameters: HashMap::new(),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };
        act.mark_applied("electricity");
        act.mark_applied("electricity");
        assert_eq!(act.applied_sectors, vec!["electricity".to_string()]);
    }

    #[test]
    fn uncertainty_completeness() {
        assert!(Uncertainty::Lognormal { loc: 0.0, scale: 0.1 }.is_complete());
        assert!(!Uncertainty::Uniform { min: f64::NAN, max: 1.0 }.is_complete());
    }
}
