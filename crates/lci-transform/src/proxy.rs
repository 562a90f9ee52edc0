//! ProxyFabricator: clones a template activity into a new location,
//! relinking its technosphere inputs into the new location's context.

use lci_core::{
    Activity, ActivityId, ActivityIndex, ExchangeKind, GeoResolver, RelinkCache, RelinkKey,
};
use tracing::debug;

use crate::error::{FabricationError, FabricationResult};

/// Candidate selection order used when more than one template shares
/// (name, product): prefer the IAM-region's own ecoinvent set, then these
/// aggregates in priority order, with `GLO`/`RoW` dropped whenever any other
/// candidate survives.
const FALLBACK_PRIORITY: &[&str] = &["RER", "Europe without Switzerland", "RoW", "GLO", "CH"];

pub struct ProxyFabricator<'a> {
    geo: &'a GeoResolver,
}

impl<'a> ProxyFabricator<'a> {
    pub fn new(geo: &'a GeoResolver) -> Self {
        Self { geo }
    }

    /// Pick the best candidate among `candidates` (all sharing the same
    /// name/product) for target location `target`.
    fn select_candidate(&self, candidates: &[ActivityId], target: &str, index: &ActivityIndex) -> Option<ActivityId> {
        if candidates.is_empty() {
            return None;
        }
        let eco_set = self.geo.iam_to_eco(target);
        let in_region: Vec<ActivityId> = candidates
            .iter()
            .copied()
            .filter(|id| index.get(*id).map(|a| eco_set.contains(&a.location)).unwrap_or(false))
            .collect();
        if !in_region.is_empty() {
            return Some(in_region[0]);
        }

        for preferred in FALLBACK_PRIORITY {
            let matches: Vec<ActivityId> = candidates
                .iter()
                .copied()
                .filter(|id| index.get(*id).map(|a| a.location == *preferred).unwrap_or(false))
                .collect();
            if !matches.is_empty() {
                return Some(matches[0]);
            }
        }

        let non_global: Vec<ActivityId> = candidates
            .iter()
            .copied()
            .filter(|id| {
                index
                    .get(*id)
                    .map(|a| a.location != "GLO" && a.location != "RoW")
                    .unwrap_or(false)
            })
            .collect();
        non_global.first().copied().or_else(|| candidates.first().copied())
    }

    /// Fabricate a proxy of the best candidate from `candidates` at
    /// `target_location`, relinking its technosphere exchanges via `cache`,
    /// and insert the result into `index`. Returns the new activity's id.
    pub fn fabricate(
        &self,
        candidates: &[ActivityId],
        target_location: &str,
        production_volume: Option<f64>,
        index: &mut ActivityIndex,
        cache: &mut RelinkCache,
        eps: f64,
    ) -> FabricationResult<ActivityId> {
        let source_id = self.select_candidate(candidates, target_location, index).ok_or_else(|| {
            let (name, product) = candidates
                .first()
                .and_then(|id| index.get(*id))
                .map(|a| (a.name.clone(), a.reference_product.clone()))
                .unwrap_or_else(|| ("<unknown>".to_string(), "<unknown>".to_string()));
            FabricationError::NoCandidateInDatabase {
                location: target_location.to_string(),
                name,
                product,
            }
        })?;

        let mut proxy = index.get(source_id).cloned().ok_or_else(|| FabricationError::NoCandidateInDatabase {
            location: target_location.to_string(),
            name: "<unknown>".to_string(),
            product: "<unknown>".to_string(),
        })?;

        proxy.location = target_location.to_string();
        proxy.applied_sectors.clear();

        for exchange in proxy.production_exchanges_mut() {
            exchange.amount = 1.0;
            exchange.set_production_volume(production_volume.unwrap_or(0.0));
        }

        let new_id = index.reserve_id();
        proxy.id = new_id;

        for exchange in &mut proxy.exchanges {
            if let ExchangeKind::Technosphere { product, .. } = &exchange.kind {
                let key = RelinkKey::new(product.clone(), target_location.to_string(), source_id);
                let candidates_for_product = index.find_any_producer_of(product);
                let shares = cache.resolve(key.clone(), &candidates_for_product, index, eps);
                if let Some(first) = shares.first() {
                    if let ExchangeKind::Technosphere { producer, .. } = &mut exchange.kind {
                        *producer = Some(first.producer);
                    }
                } else {
                    debug!(product, location = target_location, "no relink candidate for proxy technosphere exchange");
                }
            }
        }

        index.insert_with_id(proxy)?;
        Ok(new_id)
    }
}
