//! Generation-counted weak handles.
//!
//! Asynchronous completions must be able to reference a target, process or
//! thread without extending its lifetime. Every long-lived client object
//! registers a slot here on construction and releases it on destruction;
//! release bumps the slot generation so every outstanding handle derived
//! from it expires. Resolving is the single liveness check a completion
//! performs before touching client state.

use crate::client::target::TargetId;
use crate::protocol::{ProcessId, ThreadId};

/// What a registry slot points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Target(TargetId),
    Process(ProcessId),
    Thread(ProcessId, ThreadId),
}

/// Non-owning reference to a client object. Cheap to copy, never dangles:
/// resolving after the object is destroyed yields [`None`], never stale state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakHandle {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    object: Option<ObjectRef>,
}

/// Arena of handle slots with free-list reuse.
#[derive(Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object: ObjectRef) -> WeakHandle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                WeakHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                WeakHandle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Invalidate every handle derived from this slot.
    pub fn release(&mut self, handle: WeakHandle) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation == handle.generation && slot.object.is_some() {
            slot.object = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
        }
    }

    /// Repoint a live slot at a new identity without invalidating handles.
    /// A launch reply assigns the agent pid to a process that was registered
    /// before the pid was known.
    pub fn rebind(&mut self, handle: WeakHandle, object: ObjectRef) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation == handle.generation && slot.object.is_some() {
            slot.object = Some(object);
        }
    }

    /// Resolve a handle into a live object reference.
    pub fn resolve(&self, handle: WeakHandle) -> Option<ObjectRef> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.object
        } else {
            None
        }
    }
}
