//! The IAM numeric data contract: typed, dimension-labeled arrays the engine
//! treats as pure lookup tables. The container itself (the real xarray-like
//! store) lives outside this crate; `Tensor4` is the minimal in-memory
//! stand-in that implements the lookup semantics the engine actually relies
//! on, so the rest of the workspace compiles and tests end to end.

use std::collections::HashMap;

/// A 4-D lookup table over (scenario, region, variable, year), the shape
/// every market-mix and efficiency tensor in the engine needs.
#[derive(Debug, Clone, Default)]
pub struct Tensor4 {
    data: HashMap<(String, String, String, i32), f64>,
    years_by_key: HashMap<(String, String, String), Vec<i32>>,
}

impl Tensor4 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, scenario: &str, region: &str, variable: &str, year: i32, value: f64) {
        let key = (scenario.to_string(), region.to_string(), variable.to_string());
        let years = self.years_by_key.entry(key.clone()).or_default();
        if !years.contains(&year) {
            years.push(year);
            years.sort_unstable();
        }
        self.data.insert((scenario.to_string(), region.to_string(), variable.to_string(), year), value);
    }

    /// True iff this tensor has any data at all for (scenario, region, variable).
    pub fn has_variable(&self, scenario: &str, region: &str, variable: &str) -> bool {
        self.years_by_key
            .contains_key(&(scenario.to_string(), region.to_string(), variable.to_string()))
    }

    /// Look up a value at (scenario, region, variable, year) with
    /// clamp-at-bounds / linear-interpolation-inside semantics. Returns
    /// `None` only when no data exists at all for the (scenario, region,
    /// variable) triple — callers decide the NaN/None fallback (0 for
    /// additive shares, 1 for multiplicative ratios).
    pub fn get(&self, scenario: &str, region: &str, variable: &str, year: i32) -> Option<f64> {
        let key = (scenario.to_string(), region.to_string(), variable.to_string());
        let years = self.years_by_key.get(&key)?;
        if years.is_empty() {
            return None;
        }
        if let Some(&v) = self.data.get(&(scenario.to_string(), region.to_string(), variable.to_string(), year)) {
            if v.is_finite() {
                return Some(v);
            }
            return self.interp_around(&key, years, year, true);
        }
        self.interp_around(&key, years, year, false)
    }

    fn value_at(&self, key: &(String, String, String), year: i32) -> Option<f64> {
        self.data.get(&(key.0.clone(), key.1.clone(), key.2.clone(), year)).copied()
    }

    fn interp_around(
        &self,
        key: &(String, String, String),
        years: &[i32],
        year: i32,
        skip_nan_year: bool,
    ) -> Option<f64> {
        let first = years[0];
        let last = *years.last().unwrap();
        if year <= first {
            return self.nearest_finite(key, years, 0, 1);
        }
        if year >= last {
            return self.nearest_finite(key, years, years.len() as isize - 1, -1);
        }
        // Find bracketing years for linear interpolation.
        let idx = years.partition_point(|&y| y <= year);
        let lo_year = years[idx - 1];
        let hi_year = years[idx];
        if skip_nan_year && lo_year == year {
            // The exact-year value was NaN; interpolate using neighbors instead.
            let lo_val = self.nearest_finite(key, years, idx as isize - 2, -1)?;
            let hi_val = self.nearest_finite(key, years, idx as isize, 1)?;
            return Some(lo_val + (hi_val - lo_val) * (year - lo_year) as f64 / (hi_year - lo_year).max(1) as f64);
        }
        let lo_val = self.value_at(key, lo_year).filter(|v| v.is_finite())?;
        let hi_val = self.value_at(key, hi_year).filter(|v| v.is_finite())?;
        if lo_year == hi_year {
            return Some(lo_val);
        }
        let t = (year - lo_year) as f64 / (hi_year - lo_year) as f64;
        Some(lo_val + (hi_val - lo_val) * t)
    }

    fn nearest_finite(&self, key: &(String, String, String), years: &[i32], start: isize, step: isize) -> Option<f64> {
        let mut i = start;
        while i >= 0 && (i as usize) < years.len() {
            if let Some(v) = self.value_at(key, years[i as usize]) {
                if v.is_finite() {
                    return Some(v);
                }
            }
            i += step;
        }
        None
    }

    /// Convenience for the common "ratio" lookup used by EfficiencyRescaler:
    /// NaN/missing coerces to 1.0 (no change) rather than 0.0.
    pub fn get_or_one(&self, scenario: &str, region: &str, variable: &str, year: i32) -> f64 {
        self.get(scenario, region, variable, year).unwrap_or(1.0)
    }

    /// Convenience for "share" lookups used by MarketBuilder/CO2Rebalancer:
    /// NaN/missing coerces to 0.0.
    pub fn get_or_zero(&self, scenario: &str, region: &str, variable: &str, year: i32) -> f64 {
        self.get(scenario, region, variable, year).unwrap_or(0.0)
    }
}

/// The engine's view of an IAM data source: each named attribute is either
/// disabled (`None`) or a populated [`Tensor4`]. Sector-disabled attributes
/// let `SectorTransformer` skip a sector cleanly rather than treat missing
/// data as an error.
pub trait IamDataCollection: Send + Sync {
    fn tensor(&self, name: &str) -> Option<&Tensor4>;
}

/// A simple named-map implementation of [`IamDataCollection`] sufficient for
/// tests and for callers who build their tensors programmatically rather
/// than loading them from the IAM container's own format.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIamData {
    tensors: HashMap<String, Tensor4>,
}

impl InMemoryIamData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tensor(mut self, name: impl Into<String>, tensor: Tensor4) -> Self {
        self.tensors.insert(name.into(), tensor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor4) {
        self.tensors.insert(name.into(), tensor);
    }
}

impl IamDataCollection for InMemoryIamData {
    fn tensor(&self, name: &str) -> Option<&Tensor4> {
        self.tensors.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_year_lookup() {
        let mut t = Tensor4::new();
        t.set("SSP2", "EUR", "solar", 2020, 0.3);
        assert_eq!(t.get("SSP2", "EUR", "solar", 2020), Some(0.3));
    }

    #[test]
    fn linear_interpolation_between_years() {
        let mut t = Tensor4::new();
        t.set("SSP2", "EUR", "solar", 2020, 0.2);
        t.set("SSP2", "EUR", "solar", 2030, 0.4);
        let v = t.get("SSP2", "EUR", "solar", 2025).unwrap();
        assert!((v - 0.3).abs() < 1e-9);
    }

    #[test]
    fn clamps_at_bounds() {
        let mut t = Tensor4::new();
        t.set("SSP2", "EUR", "solar", 2020, 0.2);
        t.set("SSP2", "EUR", "solar", 2030, 0.4);
        assert_eq!(t.get("SSP2", "EUR", "solar", 2010), Some(0.2));
        assert_eq!(t.get("SSP2", "EUR", "solar", 2100), Some(0.4));
    }

    #[test]
    fn missing_variable_returns_none() {
        let t = Tensor4::new();
        assert_eq!(t.get("SSP2", "EUR", "solar", 2020), None);
        assert_eq!(t.get_or_zero("SSP2", "EUR", "solar", 2020), 0.0);
        assert_eq!(t.get_or_one("SSP2", "EUR", "solar", 2020), 1.0);
    }

    #[test]
    fn nan_value_is_skipped_in_interpolation() {
        let mut t = Tensor4::new();
        t.set("SSP2", "EUR", "solar", 2020, 0.2);
        t.set("SSP2", "EUR", "solar", 2025, f64::NAN);
        t.set("SSP2", "EUR", "solar", 2030, 0.4);
        let v = t.get("SSP2", "EUR", "solar", 2025).unwrap();
        assert!((v - 0.3).abs() < 1e-9);
    }

    #[test]
    fn in_memory_collection_round_trip() {
        let mut t = Tensor4::new();
        t.set("SSP2", "EUR", "solar", 2020, 0.3);
        let data = InMemoryIamData::new().with_tensor("electricity_markets", t);
        assert!(data.tensor("electricity_markets").is_some());
        assert!(data.tensor("steel_markets").is_none());
    }
}
