//! The graph-rewriting kernel: proxy fabrication, market construction,
//! efficiency rescaling, CO2 rebalancing, per-sector orchestration, and
//! database validation.

pub mod co2;
pub mod efficiency;
pub mod error;
pub mod market;
pub mod proxy;
pub mod sector;
pub mod validator;

pub use co2::{dominant_product, world_weighted_share, Co2Rebalancer, FlowPair};
pub use efficiency::EfficiencyRescaler;
pub use error::{FabricationError, FabricationResult, MarketError, MarketResult, RescaleError, RescaleResult, ValidationError};
pub use market::{market_sum, CandidateSets, MarketBuilder, SystemModel};
pub use proxy::ProxyFabricator;
pub use sector::{SectorContext, SectorTransformer};
pub use validator::DatabaseValidator;
