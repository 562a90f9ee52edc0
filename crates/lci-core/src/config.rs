//! Tunable constants threaded through every component as a context value
//! rather than read from globals, so per-scenario overrides don't require
//! mutable global state.

/// Engine-wide tunables with sane defaults; callers may override any of
/// them per scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Floor for production volumes used as allocation weights.
    pub production_volume_eps: f64,
    /// Acceptable range for a market's technosphere-input sum.
    pub market_sum_bounds: (f64, f64),
    /// Minimum self-loop amount considered a circular-reference violation.
    pub self_loop_threshold: f64,
    /// Clamp bounds applied to an efficiency rescale factor.
    pub efficiency_clamp_bounds: (f64, f64),
    /// Above this eff_old, EfficiencyRescaler skips the activity as a sanity gate.
    pub efficiency_sanity_max: f64,
    /// Relative CO2 mass-balance drift tolerance.
    pub co2_balance_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            production_volume_eps: 1e-9,
            market_sum_bounds: (0.99, 1.15),
            self_loop_threshold: 0.2,
            efficiency_clamp_bounds: (0.5, 1.5),
            efficiency_sanity_max: 1.1,
            co2_balance_tolerance: 0.20,
        }
    }
}
