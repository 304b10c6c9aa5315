//! Reusable instances for high-churn ephemeral entities.
//!
//! [`ObjectPool`] never fails to hand out an instance: once it is at
//! capacity it reclaims the least recently used live slot and logs a
//! warning. Handles carry a generation, so a handle to a released or
//! reclaimed slot stops resolving and no instance is ever reachable from
//! two live handles.
//!
//! [`MountedPool`] is the display-visible variant. Instances are attached
//! once when constructed and stay attached while parked in the free list;
//! [`Poolable::reset`] is expected to hide or relocate them.

use crate::error::NetcodeError;

pub trait Poolable: Default {
    /// Returns the instance to its pristine state on release.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    live: bool,
    last_used: u64,
}

#[derive(Debug, Clone, Copy)]
struct Acquired {
    handle: PoolHandle,
    fresh: bool,
}

#[derive(Debug)]
pub struct ObjectPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    capacity: usize,
    clock: u64,
    forced_reclaims: u64,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            clock: 0,
            forced_reclaims: 0,
        }
    }

    pub fn acquire(&mut self) -> PoolHandle {
        self.acquire_slot().handle
    }

    fn acquire_slot(&mut self) -> Acquired {
        self.clock += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.live = true;
            slot.last_used = self.clock;
            return Acquired {
                handle: handle_for(index, slot),
                fresh: false,
            };
        }

        if self.slots.len() < self.capacity {
            let index = self.slots.len();
            self.slots.push(Slot {
                value: T::default(),
                generation: 0,
                live: true,
                last_used: self.clock,
            });
            return Acquired {
                handle: handle_for(index, &self.slots[index]),
                fresh: true,
            };
        }

        // Every slot is live; the free list is empty.
        let index = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(index, _)| index)
            .unwrap_or(0);

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value.reset();
        slot.last_used = self.clock;
        self.forced_reclaims += 1;

        log::warn!(
            "{}",
            NetcodeError::Capacity {
                capacity: self.capacity,
                slot: index,
            }
        );

        Acquired {
            handle: handle_for(index, slot),
            fresh: false,
        }
    }

    /// Returns `false` when the handle is stale or already released.
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        let Some(slot) = self.live_slot_mut(handle) else {
            return false;
        };

        slot.value.reset();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        true
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.live && slot.generation == handle.generation)
            .map(|slot| &slot.value)
    }

    /// Mutable access counts as a use for reclaim ordering.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.clock += 1;
        let clock = self.clock;
        self.live_slot_mut(handle).map(|slot| {
            slot.last_used = clock;
            &mut slot.value
        })
    }

    pub fn is_live(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.live)
            .map(|(index, slot)| (handle_for(index, slot), &slot.value))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }

    /// Instances constructed so far, live or parked.
    pub fn instance_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn forced_reclaims(&self) -> u64 {
        self.forced_reclaims
    }

    fn live_slot_mut(&mut self, handle: PoolHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.live && slot.generation == handle.generation)
    }

    fn instances_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|slot| &mut slot.value)
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

fn handle_for<T>(index: usize, slot: &Slot<T>) -> PoolHandle {
    PoolHandle {
        index: index as u32,
        generation: slot.generation,
    }
}

/// Attach/detach capability injected by the display layer.
pub trait DisplayHooks<T> {
    fn attach(&mut self, item: &mut T);
    fn detach(&mut self, item: &mut T);
}

impl<T, H: DisplayHooks<T> + ?Sized> DisplayHooks<T> for Box<H> {
    fn attach(&mut self, item: &mut T) {
        (**self).attach(item);
    }

    fn detach(&mut self, item: &mut T) {
        (**self).detach(item);
    }
}

/// Hooks for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplay;

impl<T> DisplayHooks<T> for NoDisplay {
    fn attach(&mut self, _item: &mut T) {}
    fn detach(&mut self, _item: &mut T) {}
}

pub struct MountedPool<T, H> {
    pool: ObjectPool<T>,
    hooks: H,
}

impl<T: Poolable, H: DisplayHooks<T>> MountedPool<T, H> {
    pub fn new(capacity: usize, hooks: H) -> Self {
        Self {
            pool: ObjectPool::new(capacity),
            hooks,
        }
    }

    pub fn acquire(&mut self) -> PoolHandle {
        let acquired = self.pool.acquire_slot();
        if acquired.fresh {
            if let Some(item) = self.pool.get_mut(acquired.handle) {
                self.hooks.attach(item);
            }
        }
        acquired.handle
    }

    /// Parks the instance without detaching it.
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        self.pool.release(handle)
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.pool.get(handle)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.pool.get_mut(handle)
    }

    pub fn pool(&self) -> &ObjectPool<T> {
        &self.pool
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Detaches every constructed instance and empties the pool.
    pub fn teardown(&mut self) {
        let hooks = &mut self.hooks;
        for item in self.pool.instances_mut() {
            hooks.detach(item);
        }
        self.pool.clear();
    }
}
