// In: src/bridge/registry.rs

//! Generation-checked handle table.
//!
//! A handle packs `(generation << 32) | slot_index`. Generations start at 1, so no
//! issued handle is ever 0. Releasing a handle bumps its slot's generation before
//! the slot is recycled, which makes every copy of the old handle resolve to
//! "not found" from then on.

use log::debug;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

use crate::pipeline::Pipeline;

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

#[derive(Debug)]
struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// A process-wide or test-local table of `Arc<T>` addressed by opaque `u64` handles.
#[derive(Debug)]
pub struct HandleRegistry<T> {
    inner: RwLock<Slots<T>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }
}

fn pack(generation: u32, index: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

fn unpack(handle: u64) -> (u32, u32) {
    ((handle >> 32) as u32, handle as u32)
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a fully built value and returns its handle.
    pub fn insert(&self, value: T) -> u64 {
        self.insert_arc(Arc::new(value))
    }

    pub fn insert_arc(&self, value: Arc<T>) -> u64 {
        let mut inner = self.inner.write();
        inner.live += 1;
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.value = Some(value);
            return pack(slot.generation, index);
        }
        let index = inner.slots.len() as u32;
        inner.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        pack(1, index)
    }

    /// The live value behind `handle`, or `None` for 0, stale or foreign handles.
    pub fn get(&self, handle: u64) -> Option<Arc<T>> {
        let (generation, index) = unpack(handle);
        let inner = self.inner.read();
        let slot = inner.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.clone()
    }

    /// Invalidates `handle` and returns the value it held. Callers that already
    /// cloned the `Arc` keep a working reference until they drop it.
    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        let (generation, index) = unpack(handle);
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        inner.free.push(index);
        inner.live -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static PIPELINES: OnceLock<HandleRegistry<Pipeline>> = OnceLock::new();

/// The process-wide pipeline registry behind the C and Python surfaces.
pub fn pipelines() -> &'static HandleRegistry<Pipeline> {
    PIPELINES.get_or_init(|| {
        debug!("initialising global pipeline registry");
        HandleRegistry::new()
    })
}
