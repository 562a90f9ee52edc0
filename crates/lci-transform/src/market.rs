//! MarketBuilder: constructs regional market activities whose technosphere
//! inputs proportion technologies/fuels to match an IAM-projected mix, then
//! relinks the old market's consumers onto the new regional ones.

use std::collections::HashMap;

use lci_core::{
    Activity, ActivityId, ActivityIndex, BiosphereFlowKey, Exchange, ExchangeKind, GeoResolver,
    RelinkCache,
};
use lci_iam::{IamDataCollection, MarketRecipe};
use tracing::warn;

use crate::error::{MarketError, MarketResult};
use crate::proxy::ProxyFabricator;

/// System model selects the blacklist applied before weight normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemModel {
    Cutoff,
    Consequential,
}

/// Per-variable candidate producer sets the caller supplies alongside the
/// recipe (the recipe only names the IAM variable; which activities qualify
/// as that technology is a database-specific lookup the caller resolves via
/// `ActivityIndex` filters before calling `MarketBuilder`).
pub type CandidateSets = HashMap<String, Vec<ActivityId>>;

pub struct MarketBuilder<'a> {
    geo: &'a GeoResolver,
    market_sum_bounds: (f64, f64),
}

impl<'a> MarketBuilder<'a> {
    pub fn new(geo: &'a GeoResolver, market_sum_bounds: (f64, f64)) -> Self {
        Self { geo, market_sum_bounds }
    }

    /// Build the market for `recipe` in region `region`, for `scenario`/`year`.
    /// `candidates` maps each recipe variable to its pool of producer ids. A
    /// variable with a positive share but no in-region or fallback-region
    /// candidate is filled by fabricating a proxy from the global pool rather
    /// than dropping the technology from the mix.
    #[allow(clippy::too_many_arguments)]
    pub fn build_region(
        &self,
        recipe: &MarketRecipe,
        region: &str,
        scenario: &str,
        year: i32,
        system_model: SystemModel,
        mix: &dyn IamDataCollection,
        mix_tensor_name: &str,
        candidates: &CandidateSets,
        index: &mut ActivityIndex,
        eps: f64,
        relink_cache: &mut RelinkCache,
    ) -> MarketResult<ActivityId> {
        let tensor = mix.tensor(mix_tensor_name);

        let mut market = Activity {
            id: ActivityId::new(0),
            name: recipe.name.clone(),
            reference_product: recipe.reference_product.clone(),
            location: region.to_string(),
            unit: recipe.unit.clone(),
            exchanges: vec![Exchange::production(&recipe.name, &recipe.reference_product, &recipe.unit, 1.0)],
            parameters: HashMap::new(),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };

        let blacklisted: Vec<&String> = match system_model {
            SystemModel::Consequential => recipe.blacklist.consequential.iter().collect(),
            SystemModel::Cutoff => Vec::new(),
        };

        for (variable, iam_var) in &recipe.iam_aliases {
            if blacklisted.iter().any(|b| *b == variable) {
                continue;
            }
            let share = tensor
                .map(|t| t.get_or_zero(scenario, region, iam_var, year))
                .unwrap_or(0.0);
            if share <= 0.0 {
                continue;
            }
            let pool = candidates.get(variable).cloned().unwrap_or_default();
            let eco_set = self.geo.iam_to_eco(region);
            let mut selected: Vec<ActivityId> = pool
                .iter()
                .copied()
                .filter(|id| index.get(*id).map(|a| eco_set.contains(&a.location)).unwrap_or(false))
                .collect();
            if selected.is_empty() {
                selected = pool
                    .iter()
                    .copied()
                    .filter(|id| index.get(*id).map(|a| a.location == "RoW" || a.location == "GLO").unwrap_or(false))
                    .collect();
            }
            if selected.is_empty() && !pool.is_empty() {
                let fabricator = ProxyFabricator::new(self.geo);
                let proxy_id = fabricator.fabricate(&pool, region, None, index, relink_cache, eps)?;
                selected = vec![proxy_id];
            }
            if selected.is_empty() {
                warn!(variable, region, "no candidates available for market variable, skipping");
                continue;
            }

            let weights = production_volume_weights(&selected, index, eps);
            for (producer, w) in selected.iter().zip(weights.iter()) {
                let amount = share * w * recipe.conversion_factor;
                let product = index.get(*producer).map(|a| a.reference_product.clone()).unwrap_or_default();
                let producer_location = index.get(*producer).map(|a| a.location.clone()).unwrap_or_default();
                market.exchanges.push(Exchange {
                    name: index.get(*producer).map(|a| a.name.clone()).unwrap_or_default(),
                    unit: recipe.unit.clone(),
                    amount,
                    uncertainty: None,
                    kind: ExchangeKind::Technosphere {
                        product,
                        location: producer_location,
                        producer: Some(*producer),
                    },
                });
            }
        }

        for ancillary in &recipe.ancillary_exchanges {
            if ancillary.is_biosphere {
                market.exchanges.push(Exchange::biosphere(
                    &ancillary.name,
                    BiosphereFlowKey::new(&ancillary.name, "air", "unspecified", &ancillary.unit),
                    &ancillary.unit,
                    ancillary.amount,
                ));
            } else {
                market.exchanges.push(Exchange {
                    name: ancillary.name.clone(),
                    unit: ancillary.unit.clone(),
                    amount: ancillary.amount,
                    uncertainty: None,
                    kind: ExchangeKind::Technosphere {
                        product: ancillary.name.clone(),
                        location: region.to_string(),
                        producer: None,
                    },
                });
            }
        }

        let sum = market_sum(&market, &recipe.reference_product);
        let (lower, upper) = self.market_sum_bounds;
        if sum < lower || sum > upper {
            return Err(MarketError::SumOutOfBounds {
                name: recipe.name.clone(),
                location: region.to_string(),
                sum,
                lower,
                upper,
            });
        }

        let id = index.reserve_id();
        market.id = id;
        index.insert_with_id(market)?;
        Ok(id)
    }

    /// Synthesize a `World` aggregate market as a production-volume-weighted
    /// sum of already-built regional markets, per the Open Question decision
    /// to weight by production volume (see DESIGN.md).
    pub fn synthesize_world(
        &self,
        recipe: &MarketRecipe,
        regional_markets: &[ActivityId],
        index: &mut ActivityIndex,
        eps: f64,
    ) -> MarketResult<ActivityId> {
        let weights = production_volume_weights(regional_markets, index, eps);

        let mut merged: HashMap<(String, String, String), f64> = HashMap::new();
        for (market_id, w) in regional_markets.iter().zip(weights.iter()) {
            if let Some(market) = index.get(*market_id) {
                for exchange in market.technosphere_exchanges() {
                    if let ExchangeKind::Technosphere { product, location, .. } = &exchange.kind {
                        let key = (exchange.name.clone(), product.clone(), location.clone());
                        *merged.entry(key).or_insert(0.0) += exchange.amount * w;
                    }
                }
            }
        }

        let mut world = Activity {
            id: ActivityId::new(0),
            name: recipe.name.clone(),
            reference_product: recipe.reference_product.clone(),
            location: "World".to_string(),
            unit: recipe.unit.clone(),
            exchanges: vec![Exchange::production(&recipe.name, &recipe.reference_product, &recipe.unit, 1.0)],
            parameters: HashMap::new(),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };

        for ((name, product, location), amount) in merged {
            world.exchanges.push(Exchange::technosphere(name, product, location, &recipe.unit, amount));
        }

        let id = index.reserve_id();
        world.id = id;
        index.insert_with_id(world)?;
        Ok(id)
    }

    /// Rewrite every consumer of `old_market_name`/`old_product` (across any
    /// location) to point at the new regional market covering its location,
    /// preserving amounts.
    pub fn relink_consumers(
        &self,
        old_product: &str,
        region_markets: &HashMap<String, ActivityId>,
        index: &mut ActivityIndex,
    ) {
        let consumer_ids: Vec<ActivityId> = index
            .iter()
            .filter(|a| {
                a.technosphere_exchanges()
                    .any(|e| e.kind.product() == Some(old_product))
            })
            .map(|a| a.id)
            .collect();

        for consumer_id in consumer_ids {
            let consumer_location = index.get(consumer_id).map(|a| a.location.clone()).unwrap_or_default();
            let region = self.geo.eco_to_iam(&consumer_location);
            let Some(&new_market) = region_markets.get(&region) else {
                continue;
            };
            if let Some(consumer) = index.get_mut(consumer_id) {
                for exchange in consumer.technosphere_exchanges_mut() {
                    if exchange.kind.product() == Some(old_product) {
                        if let ExchangeKind::Technosphere { producer, .. } = &mut exchange.kind {
                            *producer = Some(new_market);
                        }
                    }
                }
            }
        }
    }
}

/// Σ technosphere input amounts whose product matches `product`.
pub fn market_sum(activity: &Activity, product: &str) -> f64 {
    activity
        .technosphere_exchanges()
        .filter(|e| e.kind.product() == Some(product))
        .map(|e| e.amount)
        .sum()
}

/// Production-volume-weighted split, falling back to uniform whenever any
/// candidate's volume sits at the eps floor (no real signal) or any
/// candidate is located at `RoW` (a catch-all producer whose volume doesn't
/// represent a genuine regional share).
fn production_volume_weights(ids: &[ActivityId], index: &ActivityIndex, eps: f64) -> Vec<f64> {
    if ids.is_empty() {
        return Vec::new();
    }
    let volumes: Vec<f64> = ids.iter().map(|id| index.get(*id).map(|a| a.production_volume(eps)).unwrap_or(eps)).collect();
    let total: f64 = volumes.iter().sum();
    let any_floored = volumes.iter().any(|v| (*v - eps).abs() < eps * 1e-6);
    let any_row = ids.iter().any(|id| index.get(*id).map(|a| a.location == "RoW").unwrap_or(false));
    if total <= 0.0 || any_floored || any_row {
        let w = 1.0 / ids.len() as f64;
        return vec![w; ids.len()];
    }
    volumes.into_iter().map(|v| v / total).collect()
}
