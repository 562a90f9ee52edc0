//! CO2Rebalancer: redistributes fossil vs. non-fossil CO2 (and, by
//! extension, other combustion-linked biosphere flow pairs) across
//! downstream combustion activities according to a market's biogenic share.

use lci_core::{Activity, Exchange, ExchangeKind};
use lci_iam::BiosphereDictionary;

/// One (fossil, non-fossil) flow pair the rebalancer keeps in mass balance.
/// A single pair covers the common case; recipes may declare more than one
/// pair (e.g. carbon monoxide alongside CO2).
#[derive(Debug, Clone)]
pub struct FlowPair {
    pub fossil_name: String,
    pub nonfossil_name: String,
}

pub struct Co2Rebalancer<'a> {
    biosphere: &'a dyn BiosphereDictionary,
}

impl<'a> Co2Rebalancer<'a> {
    pub fn new(biosphere: &'a dyn BiosphereDictionary) -> Self {
        Self { biosphere }
    }

    /// Rebalance one flow pair on `consumer` given the market's combustion
    /// factor and biogenic share `beta` (fraction non-fossil, in [0, 1]).
    /// `market_amount` is the amount of the market product this activity
    /// consumes (after relinking).
    pub fn rebalance(
        &self,
        consumer: &mut Activity,
        pair: &FlowPair,
        co2_factor: f64,
        beta: f64,
        market_amount: f64,
    ) {
        let beta = beta.clamp(0.0, 1.0);
        let total = co2_factor * market_amount;
        let nonfossil_portion = beta * total;
        let fossil_portion = (1.0 - beta) * total;

        let mut found_fossil = false;
        for exchange in consumer.exchanges.iter_mut() {
            if exchange.is_biosphere() && exchange.name == pair.fossil_name {
                exchange.amount = (exchange.amount - nonfossil_portion).max(0.0);
                found_fossil = true;
            }
        }
        if !found_fossil && fossil_portion > 0.0 {
            if let Some(flow) = self.biosphere.resolve_by_name(&pair.fossil_name, "air") {
                consumer.exchanges.push(Exchange::biosphere(&pair.fossil_name, flow, "kilogram", fossil_portion));
            }
        }

        if nonfossil_portion <= 0.0 {
            return;
        }
        let existing_nonfossil = consumer
            .exchanges
            .iter_mut()
            .find(|e| e.is_biosphere() && e.name == pair.nonfossil_name);
        match existing_nonfossil {
            Some(exchange) => exchange.amount += nonfossil_portion,
            None => {
                if let Some(flow) = self.biosphere.resolve_by_name(&pair.nonfossil_name, "air") {
                    consumer.exchanges.push(Exchange::biosphere(&pair.nonfossil_name, flow, "kilogram", nonfossil_portion));
                }
            }
        }
    }
}

/// Weighted average of per-region biogenic shares by production volume,
/// used to synthesize the `World` aggregate's share per the Open Question
/// decision to weight by production volume (see DESIGN.md).
pub fn world_weighted_share(region_shares: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = region_shares.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    region_shares.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
}

/// Σ technosphere inputs of `market` matching `market.reference_product`,
/// used by callers deriving `co2_factor` contributions when a market itself
/// blends multiple fuels with different combustion factors.
pub fn dominant_product(market: &Activity) -> Option<&str> {
    market
        .exchanges
        .iter()
        .find(|e| matches!(e.kind, ExchangeKind::Production { .. }))
        .and_then(|e| e.kind.product())
}
