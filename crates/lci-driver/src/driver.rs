//! ScenarioDriver: coordinates the full pipeline — load, apply sectors,
//! validate, persist — across N scenarios. Independent scenarios run in
//! parallel, one worker per scenario, over a freshly cloned baseline; an
//! unhandled structural/resolution failure aborts only that scenario.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{error, info};

use lci_core::{ActivityIndex, Diagnostics, EngineConfig, GeoResolver, RelinkCache};
use lci_iam::{BiosphereDictionary, IamDataCollection, SectorRecipe, ValidationRecord};
use lci_transform::{CandidateSets, DatabaseValidator, SectorContext, SectorTransformer, SystemModel};

use crate::cache::{hash_applied_sectors, hash_baseline, CacheKey, DiskCache};

/// One scenario to run: which model/year it represents and which sectors
/// (in order) to apply.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub scenario_id: String,
    pub model: String,
    pub year: i32,
    pub sectors: Vec<String>,
}

/// Independent scenarios each start fresh from the baseline; incremental
/// scenarios build on each other (baseline+s1, baseline+s1+s2, ...), useful
/// for difference-analysis outputs. Sector application order is always
/// deterministic within one scenario's `sectors` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Independent,
    Incremental,
}

#[derive(Debug)]
pub struct ScenarioOutput {
    pub scenario_id: String,
    pub index: ActivityIndex,
    pub diagnostics: Diagnostics,
    pub validation: Vec<ValidationRecord>,
}

pub struct ScenarioDriver<'a> {
    pub geo: &'a GeoResolver,
    pub biosphere: &'a dyn BiosphereDictionary,
    pub iam: &'a dyn IamDataCollection,
    pub config: &'a EngineConfig,
    pub recipes: &'a [SectorRecipe],
    pub iam_regions: Vec<String>,
    pub candidates_by_market: std::collections::HashMap<String, CandidateSets>,
    pub system_model: SystemModel,
    pub cache: Option<DiskCache>,
}

impl<'a> ScenarioDriver<'a> {
    /// Run every scenario per `mode`. Independent scenarios run in parallel
    /// via rayon; a cancelled/failed scenario's error is captured in its
    /// output's diagnostics rather than aborting the batch.
    pub fn run_all(&self, baseline: &ActivityIndex, specs: &[ScenarioSpec], mode: DriverMode) -> Vec<ScenarioOutput> {
        match mode {
            DriverMode::Independent => specs
                .par_iter()
                .map(|spec| self.run_scenario(baseline.clone(), spec))
                .collect(),
            DriverMode::Incremental => {
                let mut outputs = Vec::with_capacity(specs.len());
                let mut previous: Option<(Vec<String>, ActivityIndex)> = None;
                for spec in specs {
                    let start = match &previous {
                        Some((prev_sectors, prev_index)) if spec.sectors.starts_with(prev_sectors.as_slice()) => {
                            prev_index.clone()
                        }
                        _ => baseline.clone(),
                    };
                    let remaining = match &previous {
                        Some((prev_sectors, _)) if spec.sectors.starts_with(prev_sectors.as_slice()) => {
                            spec.sectors[prev_sectors.len()..].to_vec()
                        }
                        _ => spec.sectors.clone(),
                    };
                    let mut incremental_spec = spec.clone();
                    incremental_spec.sectors = remaining;
                    let output = self.run_scenario(start, &incremental_spec);
                    previous = Some((spec.sectors.clone(), output.index.clone()));
                    outputs.push(ScenarioOutput {
                        scenario_id: spec.scenario_id.clone(),
                        index: output.index,
                        diagnostics: output.diagnostics,
                        validation: output.validation,
                    });
                }
                outputs
            }
        }
    }

    fn run_scenario(&self, mut index: ActivityIndex, spec: &ScenarioSpec) -> ScenarioOutput {
        info!(scenario = spec.scenario_id, sectors = ?spec.sectors, "starting scenario");
        let baseline_count = index.len();
        let mut cache_state = RelinkCache::new();
        let mut diagnostics = Diagnostics::new();
        let mut applied: Vec<String> = Vec::new();
        let baseline_hash = hash_baseline(&index);

        for sector_name in &spec.sectors {
            let Some(recipe) = self.recipes.iter().find(|r| &r.sector == sector_name) else {
                error!(scenario = spec.scenario_id, sector = sector_name, "unknown sector, aborting scenario");
                diagnostics.add_error(lci_core::WarningKind::Data, format!("unknown sector '{sector_name}'"));
                break;
            };

            if let Some(cache) = &self.cache {
                applied.push(sector_name.clone());
                let key = CacheKey::new(baseline_hash, hash_applied_sectors(&applied));
                if let Ok(Some(activities)) = cache.get(&key) {
                    if let Ok(restored) = crate::cache::rebuild_index(activities) {
                        index = restored;
                        continue;
                    }
                }
            } else {
                applied.push(sector_name.clone());
            }

            let ctx = SectorContext {
                geo: self.geo,
                biosphere: self.biosphere,
                iam: self.iam,
                config: self.config,
                scenario: &spec.scenario_id,
                year: spec.year,
                system_model: self.system_model,
            };
            let sector_diag = SectorTransformer::apply(
                recipe,
                &ctx,
                &self.iam_regions,
                &self.candidates_by_market,
                &mut index,
                &mut cache_state,
            );
            diagnostics.merge(sector_diag);

            if let Some(cache) = &self.cache {
                let key = CacheKey::new(baseline_hash, hash_applied_sectors(&applied));
                let _ = cache.put(&key, &index);
            }
        }

        let validator = DatabaseValidator::new(self.geo, self.biosphere, self.config);
        let region_set: HashSet<String> = self.iam_regions.iter().cloned().collect();
        let validation = match validator.validate(&index, baseline_count, &spec.scenario_id, &spec.model, spec.year, &region_set) {
            Ok((records, validator_diag)) => {
                diagnostics.merge(validator_diag);
                records
            }
            Err(e) => {
                error!(scenario = spec.scenario_id, error = %e, "scenario produced no output due to structural error");
                diagnostics.add_error(lci_core::WarningKind::Data, e.to_string());
                Vec::new()
            }
        };

        info!(scenario = spec.scenario_id, summary = %diagnostics.summary(), "scenario finished");
        ScenarioOutput {
            scenario_id: spec.scenario_id.clone(),
            index,
            diagnostics,
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lci_core::{Activity, ActivityId, Exchange};
    use lci_iam::{InMemoryIamData, MarketRecipe, StaticBiosphereDictionary, Tensor4};
    use std::collections::HashMap;

    fn seed_baseline() -> ActivityIndex {
        let mut index = ActivityIndex::new();
        let mut exch = Exchange::production("electricity production, photovoltaic", "electricity, low voltage", "kilowatt hour", 1.0);
        exch.set_production_volume(500.0);
        index
            .insert(Activity {
                id: ActivityId::new(0),
                name: "electricity production, photovoltaic".into(),
                reference_product: "electricity, low voltage".into(),
                location: "DE".into(),
                unit: "kilowatt hour".into(),
                exchanges: vec![exch],
                parameters: HashMap::new(),
                classifications: vec![],
                log_parameters: HashMap::new(),
                comment: None,
                applied_sectors: vec![],
            })
            .unwrap();
        index
    }

    fn electricity_recipe() -> SectorRecipe {
        SectorRecipe {
            sector: "electricity".into(),
            depends_on: vec![],
            markets: vec![MarketRecipe {
                name: "market group for electricity, low voltage".into(),
                reference_product: "electricity, low voltage".into(),
                unit: "kilowatt hour".into(),
                iam_aliases: HashMap::from([("solar".to_string(), "Secondary Energy|Electricity|Solar".to_string())]),
                ecoinvent_aliases: HashMap::new(),
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
    fn independent_scenarios_each_start_from_baseline() {
        let geo = GeoResolver::with_default_lattice();
        let dict = StaticBiosphereDictionary::with_default_flows();
        let mut tensor = Tensor4::new();
        tensor.set("SSP2-Base", "EUR", "Secondary Energy|Electricity|Solar", 2050, 1.0);
        tensor.set("SSP2-NDC", "EUR", "Secondary Energy|Electricity|Solar", 2050, 1.0);
        let iam = InMemoryIamData::new().with_tensor("electricity_markets", tensor);
        let config = EngineConfig::default();
        let recipes = vec![electricity_recipe()];
        let baseline = seed_baseline();
        let solar_id = baseline.ids().next().unwrap();
        let mut candidates_by_market = HashMap::new();
        candidates_by_market.insert(
            "market group for electricity, low voltage".to_string(),
            CandidateSets::from([("solar".to_string(), vec![solar_id])]),
        );

        let driver = ScenarioDriver {
            geo: &geo,
            biosphere: &dict,
            iam: &iam,
            config: &config,
            recipes: &recipes,
            iam_regions: vec!["EUR".to_string()],
            candidates_by_market,
            system_model: SystemModel::Cutoff,
            cache: None,
        };

        let specs = vec![
            ScenarioSpec { scenario_id: "SSP2-Base".into(), model: "REMIND".into(), year: 2050, sectors: vec!["electricity".into()] },
            ScenarioSpec { scenario_id: "SSP2-NDC".into(), model: "REMIND".into(), year: 2050, sectors: vec!["electricity".into()] },
        ];

        let outputs = driver.run_all(&baseline, &specs, DriverMode::Independent);
        assert_eq!(outputs.len(), 2);
        for output in &outputs {
            assert!(output.index.iter().any(|a| a.name.starts_with("market")));
        }
    }

    #[test]
    fn idempotent_reapplication_leaves_applied_sectors_single_entry() {
        let geo = GeoResolver::with_default_lattice();
        let dict = StaticBiosphereDictionary::with_default_flows();
        let mut tensor = Tensor4::new();
        tensor.set("SSP2-Base", "EUR", "Secondary Energy|Electricity|Solar", 2050, 1.0);
        let iam = InMemoryIamData::new().with_tensor("electricity_markets", tensor);
        let config = EngineConfig::default();
        let recipes = vec![electricity_recipe()];
        let baseline = seed_baseline();
        let solar_id = baseline.ids().next().unwrap();
        let mut candidates_by_market = HashMap::new();
        candidates_by_market.insert(
            "market group for electricity, low voltage".to_string(),
            CandidateSets::from([("solar".to_string(), vec![solar_id])]),
        );

        let driver = ScenarioDriver {
            geo: &geo,
            biosphere: &dict,
            iam: &iam,
            config: &config,
            recipes: &recipes,
            iam_regions: vec!["EUR".to_string()],
            candidates_by_market,
            system_model: SystemModel::Cutoff,
            cache: None,
        };

        let spec = ScenarioSpec {
            scenario_id: "SSP2-Base".into(),
            model: "REMIND".into(),
            year: 2050,
            sectors: vec!["electricity".into(), "electricity".into()],
        };
        let outputs = driver.run_all(&baseline, &[spec], DriverMode::Independent);
        let output = &outputs[0];
        for activity in output.index.iter() {
            let count = activity.applied_sectors.iter().filter(|s| s.as_str() == "electricity").count();
            assert!(count <= 1, "sector recorded more than once for {}", activity.name);
        }
    }
}
