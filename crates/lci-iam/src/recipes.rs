//! Per-sector recipe files: the data-driven description of which markets a
//! sector builds, which IAM variables feed them, and which ecoinvent filters
//! select their candidate producers. Loaded the same way as a scenario
//! config: YAML by extension, falling back to YAML-then-JSON when the
//! extension is absent or unrecognized.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// `ecoinvent_aliases` from the recipe file: a positive filter (`fltr`,
/// substrings/fields a candidate must match) and a negative filter (`mask`,
/// substrings that disqualify a candidate).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcoinventAliases {
    #[serde(default)]
    pub fltr: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub mask: HashMap<String, Vec<String>>,
}

/// Per-system-model exclusions applied before weight normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blacklist {
    #[serde(default)]
    pub consequential: Vec<String>,
}

/// One market a sector's pipeline builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecipe {
    pub name: String,
    pub reference_product: String,
    pub unit: String,
    /// IAM tensor variable name per candidate technology/fuel, e.g.
    /// `{"solar": "Secondary Energy|Electricity|Solar"}`.
    pub iam_aliases: HashMap<String, String>,
    #[serde(default)]
    pub ecoinvent_aliases: HashMap<String, EcoinventAliases>,
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,
    #[serde(default)]
    pub blacklist: Blacklist,
    /// Ancillary biosphere/infrastructure exchanges appended after the
    /// technology mix (e.g. SF6 leakage, transmission-network construction).
    #[serde(default)]
    pub ancillary_exchanges: Vec<AncillaryExchange>,
    /// Combustion CO2 factor for this market's product, used by the CO2
    /// rebalancer (kg CO2 per unit of product).
    pub co2_factor: Option<f64>,
}

fn default_conversion_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncillaryExchange {
    pub name: String,
    pub unit: String,
    pub amount: f64,
    #[serde(default)]
    pub is_biosphere: bool,
}

/// The rescaling recipe for one efficiency variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficiencyRecipe {
    pub iam_variable: String,
    /// Parameter name on the activity carrying the declared efficiency, if any.
    pub parameter_name: Option<String>,
    /// Lower-heating-value table used to derive eff_old when no declared
    /// parameter exists: fuel name -> MJ per unit.
    #[serde(default)]
    pub lower_heating_values: HashMap<String, f64>,
    /// Substrings of exchange names to include in the rescale; empty means
    /// "all technosphere inputs".
    #[serde(default)]
    pub include_filter: Vec<String>,
    /// Exact exchange names excluded from rescaling regardless of filter match.
    #[serde(default)]
    pub exclude_names: Vec<String>,
    #[serde(default)]
    pub emission_exclude_substrings: Vec<String>,
    #[serde(default = "default_clamp_min")]
    pub clamp_min: f64,
    #[serde(default = "default_clamp_max")]
    pub clamp_max: f64,
}

fn default_clamp_min() -> f64 {
    0.5
}

fn default_clamp_max() -> f64 {
    1.5
}

/// A (fossil, non-fossil, co2_factor) triple the CO2 rebalancer iterates
/// over; a single pair covers the common case, but the recipe format allows
/// more than one paired flow (e.g. fossil/non-fossil CO and CO2 together).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Co2PairRecipe {
    pub fossil_flow_name: String,
    pub nonfossil_flow_name: String,
    pub fossil_variable: String,
    pub nonfossil_variable: String,
}

/// A complete sector: its markets, efficiency recipes, CO2 pairing, and the
/// other sectors that must have already run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorRecipe {
    pub sector: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub markets: Vec<MarketRecipe>,
    #[serde(default)]
    pub efficiencies: Vec<EfficiencyRecipe>,
    #[serde(default)]
    pub co2_pairs: Vec<Co2PairRecipe>,
}

impl SectorRecipe {
    pub fn market(&self, name: &str) -> Option<&MarketRecipe> {
        self.markets.iter().find(|m| m.name == name)
    }
}

/// Load a [`SectorRecipe`] from a YAML (or JSON) file, mirroring the
/// teacher's extension-sniffing scenario loader: `.yaml`/`.yml` and `.json`
/// are dispatched explicitly, anything else tries YAML then falls back to JSON.
pub fn load_recipe_from_path(path: &Path) -> Result<SectorRecipe> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading sector recipe '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing sector recipe yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing sector recipe json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing sector recipe"),
    }
}

/// Load every `*.yaml`/`*.yml`/`*.json` recipe file in `dir` and check that
/// declared dependencies form a DAG with no missing sector names.
pub fn load_recipes_from_dir(dir: &Path) -> Result<Vec<SectorRecipe>> {
    let mut recipes = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading recipe directory '{}'", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_recipe = matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("yaml") | Some("yml") | Some("json")
        );
        if is_recipe {
            recipes.push(load_recipe_from_path(&path)?);
        }
    }
    validate_dependencies(&recipes)?;
    Ok(recipes)
}

fn validate_dependencies(recipes: &[SectorRecipe]) -> Result<()> {
    let known: std::collections::HashSet<&str> = recipes.iter().map(|r| r.sector.as_str()).collect();
    for recipe in recipes {
        for dep in &recipe.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(anyhow!(
                    "sector '{}' depends on unknown sector '{}'",
                    recipe.sector,
                    dep
                ));
            }
        }
    }
    Ok(())
}

/// Topologically order `recipes` by `depends_on`, erroring on a cycle.
pub fn order_sectors(recipes: &[SectorRecipe]) -> Result<Vec<String>> {
    let by_name: HashMap<&str, &SectorRecipe> = recipes.iter().map(|r| (r.sector.as_str(), r)).collect();
    let mut order = Vec::new();
    let mut visited: HashMap<&str, bool> = HashMap::new();

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a SectorRecipe>,
        visited: &mut HashMap<&'a str, bool>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match visited.get(name) {
            Some(true) => return Ok(()),
            Some(false) => return Err(anyhow!("cyclic sector dependency involving '{}'", name)),
            None => {}
        }
        visited.insert(name, false);
        if let Some(recipe) = by_name.get(name) {
            for dep in &recipe.depends_on {
                visit(dep, by_name, visited, order)?;
            }
        }
        visited.insert(name, true);
        order.push(name.to_string());
        Ok(())
    }

    for recipe in recipes {
        visit(&recipe.sector, &by_name, &mut visited, &mut order)?;
    }
    Ok(order)
}
