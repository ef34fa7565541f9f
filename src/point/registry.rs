//! Process-wide point registry.
//!
//! Points live in an append-only arena indexed by [`PointId`]; a concurrent
//! name index maps names to ids. Registrations for different names only
//! contend on the arena push, never on each other's name shard.
//!
//! Removing a point frees its name but not its id: ids are never reused.

use crate::error::{EngineError, Result};
use crate::point::id::PointId;
use crate::point::{Point, PointDefinition};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct PointRegistry {
    points: RwLock<Vec<Arc<Point>>>,
    by_name: DashMap<String, PointId>,
    all_loaded: AtomicBool,
}

impl PointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new point. Fails with `DuplicateName` if the name is taken.
    pub fn register(&self, def: &PointDefinition) -> Result<Arc<Point>> {
        match self.by_name.entry(def.name.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateName(def.name.clone())),
            Entry::Vacant(slot) => {
                let mut points = self
                    .points
                    .write()
                    .map_err(|_| EngineError::Config("point arena lock poisoned".into()))?;
                let id = PointId(points.len() as u32);
                let point = Arc::new(Point::new(id, def));
                points.push(point.clone());
                slot.insert(id);
                tracing::debug!("Registered point '{}' as {}", def.name, id);
                Ok(point)
            }
        }
    }

    /// Drop a point's name from the index so it can be registered again.
    pub fn remove(&self, name: &str) -> Option<Arc<Point>> {
        let (_, id) = self.by_name.remove(name)?;
        tracing::debug!("Removed point '{}' ({})", name, id);
        self.get(id)
    }

    /// Look up a point by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<Point>> {
        let id = *self.by_name.get(name)?;
        self.get(id)
    }

    /// Look up a point by id.
    pub fn get(&self, id: PointId) -> Option<Arc<Point>> {
        let points = self.points.read().ok()?;
        points.get(id.index()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names of all registered points, in registration order.
    pub fn names(&self) -> Vec<String> {
        match self.points.read() {
            Ok(points) => points
                .iter()
                .filter(|p| self.by_name.get(p.name()).is_some_and(|id| *id == p.id()))
                .map(|p| p.name().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether configuration loading has completed.
    pub fn all_points_loaded(&self) -> bool {
        self.all_loaded.load(Ordering::Acquire)
    }

    /// Latch the "all points loaded" flag. Idempotent.
    pub fn mark_all_loaded(&self) {
        if !self.all_loaded.swap(true, Ordering::AcqRel) {
            tracing::info!("All {} points loaded", self.len());
        }
    }
}
