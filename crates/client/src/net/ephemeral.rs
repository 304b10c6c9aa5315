use std::collections::{HashMap, HashSet};

use glam::Vec2;

use brawl::{DisplayHooks, EphemeralState, MountedPool, PoolHandle, Poolable};

/// Where parked projectiles wait, well outside any level.
pub const PARKED_POSITION: Vec2 = Vec2::new(-1.0e6, -1.0e6);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub entity_id: u32,
    pub owner_id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub visible: bool,
}

impl Default for Projectile {
    fn default() -> Self {
        Self {
            entity_id: 0,
            owner_id: 0,
            position: PARKED_POSITION,
            velocity: Vec2::ZERO,
            visible: false,
        }
    }
}

impl Poolable for Projectile {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EphemeralSync {
    pub spawned: usize,
    pub updated: usize,
    pub released: usize,
}

/// Mirrors the server's ephemeral entity list onto pooled projectiles.
/// Every snapshot carries the complete list, so anything absent or
/// flagged invalid is released.
pub struct EphemeralTracker<H> {
    pool: MountedPool<Projectile, H>,
    handles: HashMap<u32, PoolHandle>,
}

impl<H: DisplayHooks<Projectile>> EphemeralTracker<H> {
    pub fn new(capacity: usize, hooks: H) -> Self {
        Self {
            pool: MountedPool::new(capacity, hooks),
            handles: HashMap::new(),
        }
    }

    pub fn sync(&mut self, ephemeral: &[EphemeralState]) -> EphemeralSync {
        let mut result = EphemeralSync::default();
        let mut present = HashSet::with_capacity(ephemeral.len());

        for state in ephemeral.iter().filter(|s| s.valid) {
            present.insert(state.entity_id);

            let live = self
                .handles
                .get(&state.entity_id)
                .copied()
                .filter(|handle| self.pool.pool().is_live(*handle));
            let handle = match live {
                Some(handle) => {
                    result.updated += 1;
                    handle
                }
                None => {
                    result.spawned += 1;
                    let handle = self.pool.acquire();
                    self.handles.insert(state.entity_id, handle);
                    handle
                }
            };

            if let Some(projectile) = self.pool.get_mut(handle) {
                projectile.entity_id = state.entity_id;
                projectile.owner_id = state.owner_id;
                projectile.position = Vec2::from(state.position);
                projectile.velocity = Vec2::from(state.velocity);
                projectile.visible = true;
            }
        }

        let gone: Vec<u32> = self
            .handles
            .keys()
            .copied()
            .filter(|id| !present.contains(id))
            .collect();
        for id in gone {
            if let Some(handle) = self.handles.remove(&id) {
                if self.pool.release(handle) {
                    result.released += 1;
                }
            }
        }

        // Forced reuse may have taken a slot out from under another id.
        let pool = &self.pool;
        self.handles.retain(|_, handle| pool.pool().is_live(*handle));

        result
    }

    pub fn get(&self, entity_id: u32) -> Option<&Projectile> {
        self.handles
            .get(&entity_id)
            .and_then(|handle| self.pool.get(*handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.pool.pool().iter_live().map(|(_, projectile)| projectile)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn pool(&self) -> &MountedPool<Projectile, H> {
        &self.pool
    }

    /// Parks every projectile; instances stay attached for reuse.
    pub fn clear(&mut self) {
        for (_, handle) in self.handles.drain() {
            self.pool.release(handle);
        }
    }

    pub fn teardown(&mut self) {
        self.handles.clear();
        self.pool.teardown();
    }
}
