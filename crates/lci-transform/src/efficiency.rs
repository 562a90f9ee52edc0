//! EfficiencyRescaler: rescales an activity's exchanges by a scalar factor
//! derived from declared-vs-IAM-projected efficiency, preserving
//! idempotence by dividing the declared parameter by the same factor.

use lci_core::Activity;
use lci_iam::{EfficiencyRecipe, IamDataCollection};
use tracing::{debug, warn};

use crate::error::{RescaleError, RescaleResult};

pub struct EfficiencyRescaler {
    clamp_bounds: (f64, f64),
    sanity_max: f64,
}

impl EfficiencyRescaler {
    pub fn new(clamp_bounds: (f64, f64), sanity_max: f64) -> Self {
        Self { clamp_bounds, sanity_max }
    }

    /// Determine eff_old: the declared parameter if present, else energy
    /// content of fuel inputs (lower heating value × amount) divided by the
    /// production exchange's amount.
    fn eff_old(&self, activity: &Activity, recipe: &EfficiencyRecipe) -> RescaleResult<Option<f64>> {
        if let Some(param_name) = &recipe.parameter_name {
            if let Some(&v) = activity.parameters.get(param_name) {
                return Ok(Some(v));
            }
        }
        let production_amount = activity
            .production_exchanges()
            .next()
            .map(|e| e.amount)
            .ok_or_else(|| RescaleError::NoProductionExchange(activity.name.clone()))?;
        if production_amount == 0.0 {
            return Ok(None);
        }
        let energy: f64 = activity
            .technosphere_exchanges()
            .filter_map(|e| recipe.lower_heating_values.get(&e.name).map(|lhv| lhv * e.amount))
            .sum();
        if energy == 0.0 {
            return Ok(None);
        }
        Ok(Some(energy / production_amount))
    }

    /// Rescale `activity` in place for one efficiency recipe, at
    /// `(scenario, region, year)`. Returns `true` if a rescale was applied.
    pub fn rescale(
        &self,
        activity: &mut Activity,
        recipe: &EfficiencyRecipe,
        iam: &dyn IamDataCollection,
        tensor_name: &str,
        scenario: &str,
        region: &str,
        year: i32,
    ) -> RescaleResult<bool> {
        let eff_old = match self.eff_old(activity, recipe)? {
            Some(v) => v,
            None => return Ok(false),
        };
        if eff_old > self.sanity_max {
            debug!(activity = activity.name, eff_old, "efficiency sanity gate skipped rescale");
            return Ok(false);
        }
        if (eff_old - 1.0).abs() < f64::EPSILON {
            debug!(activity = activity.name, "pass-through efficiency, untouched");
            return Ok(false);
        }

        let eff_new = match iam.tensor(tensor_name).and_then(|t| t.get(scenario, region, &recipe.iam_variable, year)) {
            Some(v) if v.is_finite() && (v - 1.0).abs() > f64::EPSILON => v,
            _ => return Ok(false),
        };

        let mut f = eff_old / eff_new;
        if (f - 1.0).abs() < f64::EPSILON {
            return Ok(false);
        }
        let (lower, upper) = self.clamp_bounds;
        if f < lower || f > upper {
            warn!(activity = activity.name, f, "efficiency factor clamped");
            f = f.clamp(lower, upper);
        }

        for exchange in activity.exchanges.iter_mut() {
            if exchange.is_biosphere()
                && recipe.emission_exclude_substrings.iter().any(|s| exchange.name.contains(s.as_str()))
            {
                continue;
            }
            if recipe.exclude_names.iter().any(|n| n == &exchange.name) {
                continue;
            }
            let included = recipe.include_filter.is_empty()
                || recipe.include_filter.iter().any(|s| exchange.name.contains(s.as_str()));
            if !included {
                continue;
            }
            if exchange.is_technosphere() || (exchange.is_biosphere() && !recipe.include_filter.is_empty()) {
                exchange.amount *= f;
            }
        }

        if let Some(param_name) = &recipe.parameter_name {
            if let Some(v) = activity.parameters.get_mut(param_name) {
                *v /= f;
            }
        }

        activity.append_comment(&format!("efficiency rescaled by factor {f:.6} ({eff_old:.4} -> {eff_new:.4})"));
        activity
            .log_parameters
            .insert("efficiency_rescale_factor".to_string(), lci_core::LogValue::Number(f));

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lci_core::{ActivityId, Exchange};
    use lci_iam::{InMemoryIamData, Tensor4};
    use std::collections::HashMap;

    fn activity_with_fuel_input() -> Activity {
        let mut a = Activity {
            id: ActivityId::new(1),
            name: "gas power plant".into(),
            reference_product: "electricity".into(),
            location: "DE".into(),
            unit: "kilowatt hour".into(),
            exchanges: vec![Exchange::production("gas power plant", "electricity", "kilowatt hour", 100.0)],
            parameters: HashMap::from([("efficiency".to_string(), 0.40)]),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };
        a.exchanges.push(Exchange::technosphere("natural gas, high pressure", "natural gas", "DE", "megajoule", 100.0));
        a
    }

    fn recipe() -> EfficiencyRecipe {
        EfficiencyRecipe {
            iam_variable: "Efficiency|Electricity|Gas".into(),
            parameter_name: Some("efficiency".into()),
            lower_heating_values: HashMap::new(),
            include_filter: vec!["natural gas".into()],
            exclude_names: vec![],
            emission_exclude_substrings: vec![],
            clamp_min: 0.5,
            clamp_max: 1.5,
        }
    }

    #[test]
    fn rescale_seed_scenario() {
        let rescaler = EfficiencyRescaler::new((0.5, 1.5), 1.1);
        let mut act = activity_with_fuel_input();
        let mut tensor = Tensor4::new();
        tensor.set("SSP2", "EUR", "Efficiency|Electricity|Gas", 2050, 0.50);
        let iam = InMemoryIamData::new().with_tensor("efficiency", tensor);

        let applied = rescaler
            .rescale(&mut act, &recipe(), &iam, "efficiency", "SSP2", "EUR", 2050)
            .unwrap();
        assert!(applied);
        let fuel = act.exchanges.iter().find(|e| e.name == "natural gas, high pressure").unwrap();
        assert!((fuel.amount - 80.0).abs() < 1e-9);
        assert!((act.parameters["efficiency"] - 0.50).abs() < 1e-9);
    }

    #[test]
    fn idempotent_when_reapplied_with_same_efficiency() {
        let rescaler = EfficiencyRescaler::new((0.5, 1.5), 1.1);
        let mut act = activity_with_fuel_input();
        let mut tensor = Tensor4::new();
        tensor.set("SSP2", "EUR", "Efficiency|Electricity|Gas", 2050, 0.50);
        let iam = InMemoryIamData::new().with_tensor("efficiency", tensor);

        rescaler.rescale(&mut act, &recipe(), &iam, "efficiency", "SSP2", "EUR", 2050).unwrap();
        let fuel_after_first = act.exchanges.iter().find(|e| e.name == "natural gas, high pressure").unwrap().amount;

        let applied_again = rescaler
            .rescale(&mut act, &recipe(), &iam, "efficiency", "SSP2", "EUR", 2050)
            .unwrap();
        assert!(!applied_again);
        let fuel_after_second = act.exchanges.iter().find(|e| e.name == "natural gas, high pressure").unwrap().amount;
        assert_eq!(fuel_after_first, fuel_after_second);
    }

    #[test]
    fn sanity_gate_skips_pathological_eff_old() {
        let rescaler = EfficiencyRescaler::new((0.5, 1.5), 1.1);
        let mut act = activity_with_fuel_input();
        act.parameters.insert("efficiency".to_string(), 1.5);
        let mut tensor = Tensor4::new();
        tensor.set("SSP2", "EUR", "Efficiency|Electricity|Gas", 2050, 0.5);
        let iam = InMemoryIamData::new().with_tensor("efficiency", tensor);
        let applied = rescaler.rescale(&mut act, &recipe(), &iam, "efficiency", "SSP2", "EUR", 2050).unwrap();
        assert!(!applied);
    }

    #[test]
    fn pass_through_at_efficiency_one_is_untouched() {
        let rescaler = EfficiencyRescaler::new((0.5, 1.5), 1.1);
        let mut act = activity_with_fuel_input();
        act.parameters.insert("efficiency".to_string(), 1.0);
        let mut tensor = Tensor4::new();
        tensor.set("SSP2", "EUR", "Efficiency|Electricity|Gas", 2050, 0.5);
        let iam = InMemoryIamData::new().with_tensor("efficiency", tensor);
        let applied = rescaler.rescale(&mut act, &recipe(), &iam, "efficiency", "SSP2", "EUR", 2050).unwrap();
        assert!(!applied);
    }
}
