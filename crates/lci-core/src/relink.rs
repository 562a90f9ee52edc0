//! Supplier allocation and the relink cache: decide which producer(s) should
//! satisfy a regionalized technosphere exchange, and remember that decision
//! so later exchanges asking the same question reuse it instead of
//! re-deriving shares from scratch.

use std::collections::HashMap;

use crate::index::ActivityIndex;
use crate::model::ActivityId;

/// One supplier and the share of demand it should receive (0.0–1.0).
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationShare {
    pub producer: ActivityId,
    pub share: f64,
}

/// The key a relink decision is memoized under: which product, requested at
/// which consuming location, is being resolved against which original
/// (pre-regionalization) producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelinkKey {
    pub product: String,
    pub consumer_location: String,
    pub original_producer: ActivityId,
}

impl RelinkKey {
    pub fn new(product: impl Into<String>, consumer_location: impl Into<String>, original_producer: ActivityId) -> Self {
        Self {
            product: product.into(),
            consumer_location: consumer_location.into(),
            original_producer,
        }
    }
}

/// Caches the allocation decision for a `RelinkKey` so that every exchange
/// sharing the same (product, consumer location, original producer) triple
/// is split identically, and so repeated relink passes over the same
/// database are idempotent.
#[derive(Debug, Default, Clone)]
pub struct RelinkCache {
    entries: HashMap<RelinkKey, Vec<AllocationShare>>,
}

impl RelinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RelinkKey) -> Option<&[AllocationShare]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: RelinkKey, shares: Vec<AllocationShare>) {
        self.entries.insert(key, shares);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a relink, consulting the cache first and computing +
    /// memoizing a fresh allocation on miss. `candidates` is the set of
    /// producer activities available for `key.product` in the consuming
    /// region; shares are weighted by production volume, falling back to a
    /// uniform split when every candidate's production volume is at the
    /// eps floor (i.e. genuinely unknown).
    pub fn resolve<'a>(
        &'a mut self,
        key: RelinkKey,
        candidates: &[ActivityId],
        index: &ActivityIndex,
        eps: f64,
    ) -> &'a [AllocationShare] {
        if !self.entries.contains_key(&key) {
            let shares = allocate(candidates, index, eps);
            self.entries.insert(key.clone(), shares);
        }
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Scale a cached allocation's shares against a new total `amount`,
    /// returning `(producer, amount)` pairs. This is the replay path: once a
    /// RelinkKey has been resolved once, every later exchange matching the
    /// same key reuses its shares rather than re-deriving them, scaled by
    /// that exchange's own amount.
    pub fn replay(&self, key: &RelinkKey, amount: f64) -> Vec<(ActivityId, f64)> {
        self.entries
            .get(key)
            .map(|shares| shares.iter().map(|s| (s.producer, s.share * amount)).collect())
            .unwrap_or_default()
    }
}

/// Production-volume-weighted allocation across `candidates`, falling back
/// to a uniform split whenever any candidate's volume carries no signal (sits
/// at the eps floor) — weighting a zero-reported producer by its floor value
/// would otherwise starve it of an allocation it may legitimately hold.
fn allocate(candidates: &[ActivityId], index: &ActivityIndex, eps: f64) -> Vec<AllocationShare> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let volumes: Vec<f64> = candidates
        .iter()
        .map(|id| index.get(*id).map(|a| a.production_volume(eps)).unwrap_or(eps))
        .collect();
    let total: f64 = volumes.iter().sum();
    let any_at_floor = volumes.iter().any(|v| (*v - eps).abs() < eps * 1e-6);

    if total <= 0.0 || any_at_floor {
        let share = 1.0 / candidates.len() as f64;
        return candidates
            .iter()
            .map(|&producer| AllocationShare { producer, share })
            .collect();
    }

    candidates
        .iter()
        .zip(volumes.iter())
        .map(|(&producer, &v)| AllocationShare { producer, share: v / total })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Exchange};
    use std::collections::HashMap as StdHashMap;

    fn activity_with_volume(idx: &mut ActivityIndex, name: &str, location: &str, volume: f64) -> ActivityId {
        let mut exch = Exchange::production(name, name, "kg", 1.0);
        exch.set_production_volume(volume);
        let act = Activity {
            id: ActivityId::new(0),
            name: name.to_string(),
            reference_product: name.to_string(),
            location: location.to_string(),
            unit: "kg".to_string(),
            exchanges: vec![exch],
            parameters: StdHashMap::new(),
            classifications: vec![],
            log_parameters: StdHashMap::new(),
            comment: None,
            applied_sectors: vec![],
        };
        idx.insert(act).unwrap()
    }

    #[test]
    fn allocation_weights_by_production_volume() {
        let mut idx = ActivityIndex::new();
        let a = activity_with_volume(&mut idx, "electricity, DE", "DE", 30.0);
        let b = activity_with_volume(&mut idx, "electricity, FR", "FR", 70.0);
        let shares = allocate(&[a, b], &idx, 1e-9);
        assert!((shares[0].share - 0.3).abs() < 1e-9);
        assert!((shares[1].share - 0.7).abs() < 1e-9);
        let sum: f64 = shares.iter().map(|s| s.share).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn allocation_falls_back_to_uniform_when_no_volume_signal() {
        let mut idx = ActivityIndex::new();
        let a = activity_with_volume(&mut idx, "x, DE", "DE", 0.0);
        let b = activity_with_volume(&mut idx, "x, FR", "FR", 0.0);
        let shares = allocate(&[a, b], &idx, 1e-9);
        assert!((shares[0].share - 0.5).abs() < 1e-9);
        assert!((shares[1].share - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cache_resolve_is_memoized() {
        let mut idx = ActivityIndex::new();
        let a = activity_with_volume(&mut idx, "x, DE", "DE", 10.0);
        let b = activity_with_volume(&mut idx, "x, FR", "FR", 10.0);
        let mut cache = RelinkCache::new();
        let key = RelinkKey::new("x", "RER", ActivityId::new(999));
        let shares1 = cache.resolve(key.clone(), &[a, b], &idx, 1e-9).to_vec();
        let shares2 = cache.resolve(key, &[a, b], &idx, 1e-9).to_vec();
        assert_eq!(shares1, shares2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replay_scales_by_current_amount() {
        let mut idx = ActivityIndex::new();
        let a = activity_with_volume(&mut idx, "x, DE", "DE", 25.0);
        let b = activity_with_volume(&mut idx, "x, FR", "FR", 75.0);
        let mut cache = RelinkCache::new();
        let key = RelinkKey::new("x", "RER", ActivityId::new(999));
        cache.resolve(key.clone(), &[a, b], &idx, 1e-9);
        let scaled = cache.replay(&key, 4.0);
        assert_eq!(scaled.len(), 2);
        let total: f64 = scaled.iter().map(|(_, amt)| amt).sum();
        assert!((total - 4.0).abs() < 1e-9);
    }

    #[test]
    fn replay_on_unknown_key_is_empty() {
        let cache = RelinkCache::new();
        let key = RelinkKey::new("x", "RER", ActivityId::new(1));
        assert!(cache.replay(&key, 1.0).is_empty());
    }
}
