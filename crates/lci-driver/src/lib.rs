//! Scenario orchestration: runs sector recipes across one or more IAM
//! scenarios against a shared baseline, with a disk-backed cache so
//! long-running batches don't hold every intermediate database in memory.

pub mod cache;
pub mod driver;
pub mod error;

pub use cache::{hash_applied_sectors, hash_baseline, CacheKey, DiskCache, CACHE_FORMAT_VERSION};
pub use driver::{DriverMode, ScenarioDriver, ScenarioOutput, ScenarioSpec};
pub use error::{DriverError, DriverResult};
