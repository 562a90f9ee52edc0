//! Activity storage and lookup: the arena that owns every [`Activity`] by
//! its minted [`ActivityId`], plus the secondary indices used to resolve
//! unlinked technosphere exchanges against it.

use std::collections::HashMap;

use crate::error::IndexError;
use crate::model::{Activity, ActivityId, ActivityKey};

/// Lookup key used for exact `(name, product, location)` resolution.
type ExactKey = (String, String, String);
/// Lookup key used when location is not yet known (name, product only).
type LooseKey = (String, String);

/// Owns the activity arena and keeps secondary indices in sync on insert.
///
/// Mirrors the "arena + stable keys" pattern: activities never move once
/// inserted, so an [`ActivityId`] handed out earlier stays valid for the
/// index's lifetime.
#[derive(Debug, Default, Clone)]
pub struct ActivityIndex {
    arena: HashMap<ActivityId, Activity>,
    by_exact: HashMap<ExactKey, ActivityId>,
    by_loose: HashMap<LooseKey, Vec<ActivityId>>,
    by_classification: HashMap<String, Vec<ActivityId>>,
    next_id: u128,
}

impl ActivityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id(&mut self) -> ActivityId {
        self.next_id += 1;
        ActivityId::new(self.next_id)
    }

    /// Insert a new activity, minting its [`ActivityId`]. Returns
    /// [`IndexError::DuplicateKey`] if an activity with the same
    /// `(name, reference_product, location)` already exists.
    pub fn insert(&mut self, mut activity: Activity) -> Result<ActivityId, IndexError> {
        let key = ActivityKey::new(&activity.name, &activity.reference_product, &activity.location);
        let exact: ExactKey = (key.name.clone(), key.reference_product.clone(), key.location.clone());
        if self.by_exact.contains_key(&exact) {
            return Err(IndexError::DuplicateKey(key.name, key.reference_product, key.location));
        }
        let id = self.mint_id();
        activity.id = id;

        self.by_exact.insert(exact, id);
        self.by_loose
            .entry((key.name.clone(), key.reference_product.clone()))
            .or_default()
            .push(id);
        for tag in &activity.classifications {
            self.by_classification.entry(tag.clone()).or_default().push(id);
        }

        self.arena.insert(id, activity);
        Ok(id)
    }

    /// Re-insert an activity that already carries an [`ActivityId`] (used by
    /// proxy fabrication, which mints ids ahead of arena insertion).
    pub fn insert_with_id(&mut self, activity: Activity) -> Result<(), IndexError> {
        let key = ActivityKey::new(&activity.name, &activity.reference_product, &activity.location);
        let exact: ExactKey = (key.name.clone(), key.reference_product.clone(), key.location.clone());
        if self.by_exact.contains_key(&exact) {
            return Err(IndexError::DuplicateKey(key.name, key.reference_product, key.location));
        }
        let id = activity.id;
        self.by_exact.insert(exact, id);
        self.by_loose
            .entry((key.name.clone(), key.reference_product.clone()))
            .or_default()
            .push(id);
        for tag in &activity.classifications {
            self.by_classification.entry(tag.clone()).or_default().push(id);
        }
        self.arena.insert(id, activity);
        Ok(())
    }

    /// Mint an id without inserting into the arena yet; used by proxy
    /// fabrication to pre-allocate a producer reference before the producer
    /// activity itself is fully built.
    pub fn reserve_id(&mut self) -> ActivityId {
        self.mint_id()
    }

    pub fn get(&self, id: ActivityId) -> Option<&Activity> {
        self.arena.get(&id)
    }

    pub fn get_mut(&mut self, id: ActivityId) -> Option<&mut Activity> {
        self.arena.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.arena.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Activity> {
        self.arena.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.arena.keys().copied()
    }

    /// Exact match on `(name, product, location)`.
    pub fn find_exact(&self, name: &str, product: &str, location: &str) -> Option<ActivityId> {
        self.by_exact
            .get(&(name.to_string(), product.to_string(), location.to_string()))
            .copied()
    }

    /// Candidates matching `(name, product)` regardless of location, used
    /// when a technosphere exchange names a location the database doesn't
    /// produce in and the relinker must search siblings.
    pub fn find_by_product(&self, name: &str, product: &str) -> Vec<ActivityId> {
        self.by_loose
            .get(&(name.to_string(), product.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// All activities carrying every product name in `product` across all
    /// producer names — a coarser fallback used by market construction when
    /// no exact process name is known in advance (e.g. new markets built
    /// from scratch).
    pub fn find_any_producer_of(&self, product: &str) -> Vec<ActivityId> {
        self.arena
            .values()
            .filter(|a| a.reference_product == product)
            .map(|a| a.id)
            .collect()
    }

    pub fn find_by_classification(&self, tag: &str) -> Vec<ActivityId> {
        self.by_classification.get(tag).cloned().unwrap_or_default()
    }

    /// Resolve exactly one producer for `(name, product, location)`,
    /// failing closed with [`IndexError::Ambiguous`] / [`IndexError::NotFound`]
    /// rather than silently picking a candidate.
    pub fn resolve_unique(
        &self,
        name: &str,
        product: &str,
        location: Option<&str>,
    ) -> Result<ActivityId, IndexError> {
        if let Some(loc) = location {
            if let Some(id) = self.find_exact(name, product, loc) {
                return Ok(id);
            }
        }
        let candidates = self.find_by_product(name, product);
        match candidates.len() {
            0 => Err(IndexError::NotFound {
                name: name.to_string(),
                product: product.to_string(),
                location: location.map(str::to_string),
            }),
            1 => Ok(candidates[0]),
            n => Err(IndexError::Ambiguous {
                name: name.to_string(),
                product: product.to_string(),
                location: location.map(str::to_string),
                count: n,
            }),
        }
    }

    /// Rebuild all secondary indices from the arena; used after bulk
    /// mutation (e.g. deserializing a baseline database) where per-insert
    /// index maintenance was skipped.
    pub fn rebuild_indices(&mut self) {
        self.by_exact.clear();
        self.by_loose.clear();
        self.by_classification.clear();
        for activity in self.arena.values() {
            let exact: ExactKey = (
                activity.name.clone(),
                activity.reference_product.clone(),
                activity.location.clone(),
            );
            self.by_exact.insert(exact, activity.id);
            self.by_loose
                .entry((activity.name.clone(), activity.reference_product.clone()))
                .or_default()
                .push(activity.id);
            for tag in &activity.classifications {
                self.by_classification.entry(tag.clone()).or_default().push(activity.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Exchange;

    fn activity(name: &str, product: &str, location: &str) -> Activity {
        Activity {
            id: ActivityId::new(0),
            name: name.to_string(),
            reference_product: product.to_string(),
            location: location.to_string(),
            unit: "kg".to_string(),
            exchanges: vec![Exchange::production(name, product, "kg", 1.0)],
            parameters: HashMap::new(),
            classifications: vec![],
            log_parameters: HashMap::new(),
            comment: None,
            applied_sectors: vec![],
        }
    }

    #[test]
    fn insert_assigns_distinct_ids() {
        let mut idx = ActivityIndex::new();
        let a = idx.insert(activity("x", "x", "DE")).unwrap();
        let b = idx.insert(activity("x", "x", "FR")).unwrap();
        assert_ne!(a, b);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut idx = ActivityIndex::new();
        idx.insert(activity("x", "x", "DE")).unwrap();
        let err = idx.insert(activity("x", "x", "DE")).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey(..)));
    }

    #[test]
    fn resolve_unique_exact_match() {
        let mut idx = ActivityIndex::new();
        let id = idx.insert(activity("x", "x", "DE")).unwrap();
        assert_eq!(idx.resolve_unique("x", "x", Some("DE")).unwrap(), id);
    }

    #[test]
    fn resolve_unique_ambiguous_without_location() {
        let mut idx = ActivityIndex::new();
        idx.insert(activity("x", "x", "DE")).unwrap();
        idx.insert(activity("x", "x", "FR")).unwrap();
        let err = idx.resolve_unique("x", "x", None).unwrap_err();
        assert!(matches!(err, IndexError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn resolve_unique_not_found() {
        let idx = ActivityIndex::new();
        let err = idx.resolve_unique("missing", "missing", None).unwrap_err();
        assert!(matches!(err, IndexError::NotFound { .. }));
    }

    #[test]
    fn find_by_classification() {
        let mut idx = ActivityIndex::new();
        let mut a = activity("x", "x", "DE");
        a.classifications.push("power".to_string());
        idx.insert(a).unwrap();
        assert_eq!(idx.find_by_classification("power").len(), 1);
        assert_eq!(idx.find_by_classification("steel").len(), 0);
    }

    #[test]
    fn rebuild_indices_after_manual_arena_edit() {
        let mut idx = ActivityIndex::new();
        idx.insert(activity("x", "x", "DE")).unwrap();
        idx.by_exact.clear();
        idx.rebuild_indices();
        assert!(idx.find_exact("x", "x", "DE").is_some());
    }
}
