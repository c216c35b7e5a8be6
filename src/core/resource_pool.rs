//! Fixed pool of relationship-bound units.
//!
//! The pool is the single owner of every [`Unit`]. Callers only ever hold
//! unit ids; every state or relationship change goes through the pool API.
//!
//! Besides free/busy state the pool tracks a symmetric relationship graph.
//! Two related units carry correlated state, so neither can be reclaimed
//! on its own: [`ResourcePool::can_reclaim_independently`] is the predicate
//! that separates a cheap release from one that needs a compensating
//! operation sequence first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::PoolError;
use crate::util::serde::UnitId;

/// Allocation state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Never handed out since pool initialization.
    Free,
    /// Held by a job, no operations in flight.
    Allocated,
    /// Held by a job with operations recorded against it.
    InUse,
    /// Reclaimed after use. Available for allocation again.
    Released,
}

impl UnitState {
    /// Whether `allocate` may hand this unit out.
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Free | Self::Released)
    }

    /// Whether a job currently holds this unit.
    pub const fn is_held(self) -> bool {
        matches!(self, Self::Allocated | Self::InUse)
    }
}

/// A scarce, stateful resource with identity.
///
/// Units are serialized for reporting only. They cannot be deserialized,
/// since a loaded unit could carry a one-sided relationship:
///
/// ```compile_fail
/// use prometheus_hybrid_scheduler::core::Unit;
///
/// let unit: Unit = serde_json::from_str(
///     r#"{"id":0,"state":"allocated","operation_count":0,"relationships":[1]}"#,
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    id: UnitId,
    state: UnitState,
    operation_count: u64,
    relationships: BTreeSet<UnitId>,
}

impl Unit {
    fn new(id: UnitId) -> Self {
        Self {
            id,
            state: UnitState::Free,
            operation_count: 0,
            relationships: BTreeSet::new(),
        }
    }

    /// Stable identifier.
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Current allocation state.
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Operations applied since the unit was last reclaimed.
    pub const fn operation_count(&self) -> u64 {
        self.operation_count
    }

    /// Units this one cannot be reclaimed independently of.
    pub const fn relationships(&self) -> &BTreeSet<UnitId> {
        &self.relationships
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Units owned by the pool.
    pub total: usize,
    /// Units available for allocation.
    pub free: usize,
    /// Units held by jobs.
    pub allocated: usize,
}

/// Owner of all units and their relationship graph.
///
/// Units live in an arena indexed by id; relationships are plain id sets,
/// never references, so the graph cannot form ownership cycles.
///
/// A pool only comes from [`ResourcePool::initialize`]; there is no
/// deserialization path around the symmetric-graph bookkeeping:
///
/// ```compile_fail
/// use prometheus_hybrid_scheduler::core::ResourcePool;
///
/// let pool: ResourcePool = serde_json::from_str(r#"{"units":[]}"#).unwrap();
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePool {
    units: Vec<Unit>,
}

impl ResourcePool {
    /// Create a pool of `n` units, all free, with ids `0..n`.
    pub fn initialize(n: usize) -> Self {
        let units = (0..n)
            .map_while(|i| UnitId::try_from(i).ok())
            .map(Unit::new)
            .collect();
        tracing::debug!(units = n, "unit pool initialized");
        Self { units }
    }

    /// Number of units owned by the pool.
    pub fn total(&self) -> usize {
        self.units.len()
    }

    /// Number of units available for allocation.
    pub fn free_count(&self) -> usize {
        self.units.iter().filter(|u| u.state.is_available()).count()
    }

    /// Look up a unit by id.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id as usize)
    }

    /// Ids of the first `n` available units in allocation order.
    ///
    /// This is exactly the set `n` successive `allocate` calls would return.
    pub fn peek_free(&self, n: usize) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.state.is_available())
            .take(n)
            .map(|u| u.id)
            .collect()
    }

    /// Allocate the lowest-id available unit.
    pub fn allocate(&mut self) -> Result<UnitId, PoolError> {
        let unit = self
            .units
            .iter_mut()
            .find(|u| u.state.is_available())
            .ok_or(PoolError::ExhaustedPool)?;
        unit.state = UnitState::Allocated;
        tracing::debug!(unit_id = unit.id, "unit allocated");
        Ok(unit.id)
    }

    /// Return a held unit to the pool.
    ///
    /// Relationships are cleared first, including every partner's
    /// back-reference, so a reclaimed unit never carries stale correlation.
    pub fn release(&mut self, id: UnitId) -> Result<(), PoolError> {
        self.held(id)?;
        let cleared = self.clear_relationships(id)?;
        if cleared > 0 {
            tracing::warn!(unit_id = id, partners = cleared, "released unit still had relationships");
        }
        let unit = self.held_mut(id)?;
        unit.state = UnitState::Released;
        unit.operation_count = 0;
        tracing::debug!(unit_id = id, "unit released");
        Ok(())
    }

    /// Insert a symmetric relationship edge. Idempotent; a self-edge is a no-op.
    pub fn record_relationship(&mut self, a: UnitId, b: UnitId) -> Result<(), PoolError> {
        self.known(a)?;
        self.known(b)?;
        if a == b {
            return Ok(());
        }
        self.units[a as usize].relationships.insert(b);
        self.units[b as usize].relationships.insert(a);
        Ok(())
    }

    /// Empty the unit's relationship set and remove its back-references.
    ///
    /// Returns how many partners were detached.
    pub fn clear_relationships(&mut self, id: UnitId) -> Result<usize, PoolError> {
        self.known(id)?;
        let partners = std::mem::take(&mut self.units[id as usize].relationships);
        for partner in &partners {
            if let Some(unit) = self.units.get_mut(*partner as usize) {
                unit.relationships.remove(&id);
            }
        }
        Ok(partners.len())
    }

    /// True iff the unit shares no relationship edge with any other unit.
    pub fn can_reclaim_independently(&self, id: UnitId) -> Result<bool, PoolError> {
        Ok(self.known(id)?.relationships.is_empty())
    }

    /// Record `count` operations applied to a held unit and mark it in use.
    pub fn record_operations(&mut self, id: UnitId, count: u64) -> Result<(), PoolError> {
        let unit = self.held_mut(id)?;
        unit.operation_count = unit.operation_count.saturating_add(count);
        unit.state = UnitState::InUse;
        Ok(())
    }

    /// Mark an in-use unit idle again (`InUse -> Allocated`).
    pub fn mark_idle(&mut self, id: UnitId) -> Result<(), PoolError> {
        let unit = self.held_mut(id)?;
        unit.state = UnitState::Allocated;
        Ok(())
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        let free = self.free_count();
        PoolStats {
            total: self.total(),
            free,
            allocated: self.total() - free,
        }
    }

    fn known(&self, id: UnitId) -> Result<&Unit, PoolError> {
        self.units.get(id as usize).ok_or(PoolError::UnknownUnit(id))
    }

    fn held(&self, id: UnitId) -> Result<&Unit, PoolError> {
        self.known(id)
            .and_then(|u| if u.state.is_held() { Ok(u) } else { Err(PoolError::UnknownUnit(id)) })
    }

    fn held_mut(&mut self, id: UnitId) -> Result<&mut Unit, PoolError> {
        match self.units.get_mut(id as usize) {
            Some(unit) if unit.state.is_held() => Ok(unit),
            _ => Err(PoolError::UnknownUnit(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_all_free() {
        let pool = ResourcePool::initialize(4);
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 4,
                free: 4,
                allocated: 0
            }
        );
        assert!((0..4).all(|id| pool.unit(id).unwrap().state() == UnitState::Free));
    }

    #[test]
    fn test_allocate_lowest_id_first() {
        let mut pool = ResourcePool::initialize(3);
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 1);
        pool.release(0).unwrap();
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 2);
    }

    #[test]
    fn test_allocate_exhausted_leaves_state_unchanged() {
        let mut pool = ResourcePool::initialize(1);
        pool.allocate().unwrap();
        let before = pool.stats();
        assert_eq!(pool.allocate(), Err(PoolError::ExhaustedPool));
        assert_eq!(pool.stats(), before);
    }

    #[test]
    fn test_release_unknown_or_free_unit() {
        let mut pool = ResourcePool::initialize(2);
        assert_eq!(pool.release(7), Err(PoolError::UnknownUnit(7)));
        assert_eq!(pool.release(0), Err(PoolError::UnknownUnit(0)));
        let id = pool.allocate().unwrap();
        pool.release(id).unwrap();
        assert_eq!(pool.release(id), Err(PoolError::UnknownUnit(id)));
        assert_eq!(pool.unit(id).unwrap().state(), UnitState::Released);
    }

    #[test]
    fn test_relationships_are_symmetric_and_idempotent() {
        let mut pool = ResourcePool::initialize(3);
        pool.record_relationship(0, 1).unwrap();
        pool.record_relationship(1, 0).unwrap();
        pool.record_relationship(2, 2).unwrap();
        assert_eq!(pool.unit(0).unwrap().relationships().len(), 1);
        assert!(pool.unit(1).unwrap().relationships().contains(&0));
        assert!(pool.can_reclaim_independently(2).unwrap());
        assert!(!pool.can_reclaim_independently(0).unwrap());
    }

    #[test]
    fn test_clear_relationships_removes_back_references() {
        let mut pool = ResourcePool::initialize(3);
        pool.record_relationship(0, 1).unwrap();
        pool.record_relationship(0, 2).unwrap();
        assert_eq!(pool.clear_relationships(0).unwrap(), 2);
        assert!(pool.can_reclaim_independently(0).unwrap());
        assert!(pool.can_reclaim_independently(1).unwrap());
        assert!(pool.can_reclaim_independently(2).unwrap());
    }

    #[test]
    fn test_release_clears_relationships() {
        let mut pool = ResourcePool::initialize(2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.record_relationship(a, b).unwrap();
        pool.release(a).unwrap();
        assert!(pool.unit(b).unwrap().relationships().is_empty());
    }

    #[test]
    fn test_relationship_with_unknown_unit_fails() {
        let mut pool = ResourcePool::initialize(2);
        assert_eq!(pool.record_relationship(0, 9), Err(PoolError::UnknownUnit(9)));
        assert!(pool.unit(0).unwrap().relationships().is_empty());
    }

    #[test]
    fn test_operation_recording_cycles_in_use() {
        let mut pool = ResourcePool::initialize(1);
        let id = pool.allocate().unwrap();
        pool.record_operations(id, 3).unwrap();
        assert_eq!(pool.unit(id).unwrap().state(), UnitState::InUse);
        assert_eq!(pool.unit(id).unwrap().operation_count(), 3);
        pool.mark_idle(id).unwrap();
        assert_eq!(pool.unit(id).unwrap().state(), UnitState::Allocated);
        pool.release(id).unwrap();
        assert_eq!(pool.unit(id).unwrap().operation_count(), 0);
        assert_eq!(pool.record_operations(id, 1), Err(PoolError::UnknownUnit(id)));
    }

    #[test]
    fn test_peek_free_matches_allocation_order() {
        let mut pool = ResourcePool::initialize(4);
        pool.allocate().unwrap();
        assert_eq!(pool.peek_free(2), vec![1, 2]);
        assert_eq!(pool.peek_free(10), vec![1, 2, 3]);
    }

    #[test]
    fn test_serialized_pool_reports_symmetric_edges() {
        let mut pool = ResourcePool::initialize(2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.record_relationship(a, b).unwrap();
        let json = serde_json::to_value(&pool).unwrap();
        assert_eq!(json["units"][0]["relationships"], serde_json::json!([1]));
        assert_eq!(json["units"][1]["relationships"], serde_json::json!([0]));
        assert_eq!(json["units"][1]["state"], "allocated");
    }
}
