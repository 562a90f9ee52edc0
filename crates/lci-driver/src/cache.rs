//! Disk-backed intermediate cache: each scenario snapshots its database to
//! disk after every sector so memory stays bounded, keyed by
//! `(baseline_hash, applied_sectors_hash, version)` and reused by later
//! runs instead of recomputing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use lci_core::ActivityIndex;

use crate::error::{DriverError, DriverResult};

pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Stable content hash of a baseline database, derived from the sorted set
/// of activity keys (cheap and sufficient for cache-key purposes — it
/// doesn't need to be a cryptographic digest, just collision-resistant
/// enough across runs of the same process family).
pub fn hash_baseline(index: &ActivityIndex) -> u64 {
    let mut keys: Vec<String> = index
        .iter()
        .map(|a| format!("{}\u{1}{}\u{1}{}", a.name, a.reference_product, a.location))
        .collect();
    keys.sort_unstable();
    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}

/// Hash of the ordered list of sectors applied so far, canonicalized by
/// joining with a separator unlikely to appear in a sector name.
pub fn hash_applied_sectors(applied: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    applied.join("\u{1}").hash(&mut hasher);
    hasher.finish()
}

pub struct CacheKey {
    pub baseline_hash: u64,
    pub applied_sectors_hash: u64,
    pub version: u32,
}

impl CacheKey {
    pub fn new(baseline_hash: u64, applied_sectors_hash: u64) -> Self {
        Self {
            baseline_hash,
            applied_sectors_hash,
            version: CACHE_FORMAT_VERSION,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{:016x}-{:016x}-v{}.json", self.baseline_hash, self.applied_sectors_hash, self.version)
    }
}

pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> DriverResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn get(&self, key: &CacheKey) -> DriverResult<Option<Vec<lci_core::Activity>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        let activities: Vec<lci_core::Activity> = serde_json::from_str(&data)?;
        Ok(Some(activities))
    }

    pub fn put(&self, key: &CacheKey, index: &ActivityIndex) -> DriverResult<()> {
        let activities: Vec<&lci_core::Activity> = index.iter().collect();
        let data = serde_json::to_string(&activities)?;
        std::fs::write(self.path_for(key), data)?;
        Ok(())
    }
}

pub fn rebuild_index(activities: Vec<lci_core::Activity>) -> Result<ActivityIndex, DriverError> {
    let mut index = ActivityIndex::new();
    for activity in activities {
        index
            .insert_with_id(activity)
            .map_err(|e| DriverError::ScenarioAborted("cache restore".to_string(), e.to_string()))?;
    }
    index.rebuild_indices();
    Ok(index)
}
