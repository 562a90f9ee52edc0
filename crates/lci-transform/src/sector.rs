//! SectorTransformer: runs one sector's recipe end to end —
//! `regionalize → build_markets → rescale_efficiencies → rebalance_emissions
//! → relink_consumers` — against a scenario's database, tracking applied
//! sectors for idempotence.

use std::collections::HashMap;

use lci_core::{ActivityIndex, Diagnostics, EngineConfig, GeoResolver, RelinkCache, WarningKind};
use lci_iam::{BiosphereDictionary, IamDataCollection, SectorRecipe};

use crate::co2::{Co2Rebalancer, FlowPair};
use crate::efficiency::EfficiencyRescaler;
use crate::market::{CandidateSets, MarketBuilder, SystemModel};

/// Context threaded through a sector run instead of reaching for global
/// state: the read-only collaborators plus the mutable per-scenario index.
pub struct SectorContext<'a> {
    pub geo: &'a GeoResolver,
    pub biosphere: &'a dyn BiosphereDictionary,
    pub iam: &'a dyn IamDataCollection,
    pub config: &'a EngineConfig,
    pub scenario: &'a str,
    pub year: i32,
    pub system_model: SystemModel,
}

pub struct SectorTransformer;

impl SectorTransformer {
    /// Apply `recipe` to `index`, returning diagnostics. A no-op (besides a
    /// logged note) if every activity carrying this sector's markets has
    /// already recorded it in `applied_sectors`.
    pub fn apply(
        recipe: &SectorRecipe,
        ctx: &SectorContext,
        iam_regions: &[String],
        candidates_by_market: &HashMap<String, CandidateSets>,
        index: &mut ActivityIndex,
        cache: &mut RelinkCache,
    ) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        if Self::already_applied(&recipe.sector, index) {
            diagnostics.add_warning(
                WarningKind::Data,
                format!("sector '{}' already applied, skipping", recipe.sector),
            );
            return diagnostics;
        }

        let market_builder = MarketBuilder::new(ctx.geo, ctx.config.market_sum_bounds);
        let rescaler = EfficiencyRescaler::new(ctx.config.efficiency_clamp_bounds, ctx.config.efficiency_sanity_max);
        let co2 = Co2Rebalancer::new(ctx.biosphere);

        // build_markets
        let mut region_markets_by_product: HashMap<String, HashMap<String, lci_core::ActivityId>> = HashMap::new();
        for market in &recipe.markets {
            let candidates = candidates_by_market.get(&market.name).cloned().unwrap_or_default();
            let mut region_markets = HashMap::new();
            for region in iam_regions {
                if region == "World" {
                    continue;
                }
                match market_builder.build_region(
                    market,
                    region,
                    ctx.scenario,
                    ctx.year,
                    ctx.system_model,
                    ctx.iam,
                    &format!("{}_markets", recipe.sector),
                    &candidates,
                    index,
                    ctx.config.production_volume_eps,
                    cache,
                ) {
                    Ok(id) => {
                        region_markets.insert(region.clone(), id);
                    }
                    Err(e) => diagnostics.add_error_with_entity(WarningKind::Balance, e.to_string(), market.name.clone()),
                }
            }
            if region_markets.len() > 1 {
                let ids: Vec<_> = region_markets.values().copied().collect();
                if let Err(e) = market_builder.synthesize_world(market, &ids, index, ctx.config.production_volume_eps) {
                    diagnostics.add_error_with_entity(WarningKind::Balance, e.to_string(), market.name.clone());
                }
            }
            // relink_consumers
            market_builder.relink_consumers(&market.reference_product, &region_markets, index);
            region_markets_by_product.insert(market.reference_product.clone(), region_markets);
        }

        // rescale_efficiencies
        for eff in &recipe.efficiencies {
            let tensor_name = format!("{}_efficiency", recipe.sector);
            let ids: Vec<_> = index.ids().collect();
            for id in ids {
                if let Some(activity) = index.get_mut(id) {
                    let region = ctx.geo.eco_to_iam(&activity.location);
                    match rescaler.rescale(activity, eff, ctx.iam, &tensor_name, ctx.scenario, &region, ctx.year) {
                        Ok(_) => {}
                        Err(e) => diagnostics.add_warning_with_entity(WarningKind::Balance, e.to_string(), activity.name.clone()),
                    }
                }
            }
        }

        // rebalance_emissions
        for pair_recipe in &recipe.co2_pairs {
            let tensor_name = format!("{}_markets", recipe.sector);
            let pair = FlowPair {
                fossil_name: pair_recipe.fossil_flow_name.clone(),
                nonfossil_name: pair_recipe.nonfossil_flow_name.clone(),
            };
            let ids: Vec<_> = index.ids().collect();
            for id in ids {
                let Some(activity) = index.get(id) else { continue };
                let location = activity.location.clone();
                let mut total_combustion = 0.0;
                for exchange in activity.technosphere_exchanges() {
                    let matched_market = exchange
                        .kind
                        .product()
                        .and_then(|product| recipe.markets.iter().find(|m| m.reference_product == product));
                    if let Some(market) = matched_market {
                        if let Some(co2_factor) = market.co2_factor {
                            total_combustion += co2_factor * exchange.amount;
                        }
                    }
                }
                if total_combustion == 0.0 {
                    continue;
                }
                let region = ctx.geo.eco_to_iam(&location);
                let beta = ctx.iam.tensor(&tensor_name).map(|t| t.get_or_zero(ctx.scenario, &region, &pair_recipe.nonfossil_variable, ctx.year)).unwrap_or(0.0);
                if let Some(activity) = index.get_mut(id) {
                    co2.rebalance(activity, &pair, 1.0, beta, total_combustion);
                }
            }
        }

        Self::mark_applied(&recipe.sector, index);
        diagnostics
    }

    fn already_applied(sector: &str, index: &ActivityIndex) -> bool {
        let total = index.len();
        if total == 0 {
            return false;
        }
        index.iter().filter(|a| a.has_applied(sector)).count() == total
    }

    fn mark_applied(sector: &str, index: &mut ActivityIndex) {
        for activity in index.iter_mut() {
            activity.mark_applied(sector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lci_core::{Activity, ActivityId, Exchange};
    use lci_iam::{InMemoryIamData, MarketRecipe, StaticBiosphereDictionary, Tensor4};
    use std::collections::HashMap as StdHashMap;

    fn seed_index() -> ActivityIndex {
        let mut index = ActivityIndex::new();
        let mut exch = Exchange::production("electricity production, photovoltaic", "electricity, low voltage", "kilowatt hour", 1.0);
        exch.set_production_volume(500.0);
        let act = Activity {
            id: ActivityId::new(0),
            name: "electricity production, photovoltaic".into(),
            reference_product: "electricity, low voltage".into(),
            location: "DE".into(),
            unit: "kilowatt hour".into(),
            exchanges: vec![exch],
            parameters: StdHashMap::new(),
            classifications: vec![],
            log_parameters: StdHashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };
        index.insert(act).unwrap();
        index
    }

    fn sector_recipe() -> SectorRecipe {
        SectorRecipe {
            sector: "electricity".into(),
            depends_on: vec![],
            markets: vec![MarketRecipe {
                name: "market group for electricity, low voltage".into(),
                reference_product: "electricity, low voltage".into(),
                unit: "kilowatt hour".into(),
                iam_aliases: StdHashMap::from([("solar".to_string(), "Secondary Energy|Electricity|Solar".to_string())]),
                ecoinvent_aliases: StdHashMap::new(),
                conversion_factor: 1.0,
                blacklist: Default::default(),
                ancillary_exchanges: vec![],
                co2_factor: None,
            }],
            efficiencies: vec![],
            co2_pairs: vec![],
        }
    }

    #[test]
    fn applying_sector_marks_idempotence_flag() {
        let geo = GeoResolver::with_default_lattice();
        let dict = StaticBiosphereDictionary::with_default_flows();
        let mut tensor = Tensor4::new();
        tensor.set("SSP2", "EUR", "Secondary Energy|Electricity|Solar", 2050, 1.0);
        let iam = InMemoryIamData::new().with_tensor("electricity_markets", tensor);
        let config = EngineConfig::default();
        let ctx = SectorContext {
            geo: &geo,
            biosphere: &dict,
            iam: &iam,
            config: &config,
            scenario: "SSP2",
            year: 2050,
            system_model: SystemModel::Cutoff,
        };

        let mut index = seed_index();
        let solar_id = index.ids().next().unwrap();
        let mut candidates_by_market = StdHashMap::new();
        candidates_by_market.insert(
            "market group for electricity, low voltage".to_string(),
            CandidateSets::from([("solar".to_string(), vec![solar_id])]),
        );
        let mut cache = RelinkCache::new();
        let recipe = sector_recipe();
        let regions = vec!["EUR".to_string()];

        let diag = SectorTransformer::apply(&recipe, &ctx, &regions, &candidates_by_market, &mut index, &mut cache);
        assert!(!diag.has_errors());
        assert!(index.iter().all(|a| a.has_applied("electricity")));

        let diag2 = SectorTransformer::apply(&recipe, &ctx, &regions, &candidates_by_market, &mut index, &mut cache);
        assert_eq!(diag2.warning_count(), 1);
    }
}
