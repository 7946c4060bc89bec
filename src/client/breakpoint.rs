use crate::client::target::TargetId;
use crate::protocol::{BreakpointId, ProcessId};
use std::collections::{BTreeMap, HashMap};
use strum_macros::Display;

/// Where a breakpoint applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointScope {
    /// Every process of the session.
    Global,
    /// Processes bound to one target, across restarts.
    Target(TargetId),
    /// One concrete live process.
    Process(ProcessId),
}

/// Process-independent breakpoint declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub scope: BreakpointScope,
    pub address: u64,
}

/// State of one per-process realization of a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BindingState {
    /// Insert request in flight.
    Pending,
    /// Agent confirmed the insert.
    Inserted,
    /// Agent rejected the insert with this status code. Other processes
    /// are unaffected.
    Failed(u32),
}

pub(super) struct Binding {
    pub(super) state: BindingState,
    pub(super) remove_inflight: bool,
}

impl Binding {
    pub(super) fn pending() -> Self {
        Self {
            state: BindingState::Pending,
            remove_inflight: false,
        }
    }
}

/// Overall breakpoint state distilled from its per-process bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BreakpointState {
    /// Not inserted anywhere (yet): no matching live process, or all
    /// inserts still in flight.
    Pending,
    /// Inserted into at least one live process.
    Inserted,
    /// Every matching process rejected the insert.
    Failed,
}

/// A client-declared intent to stop execution at an address.
///
/// Exists independent of any process; per live process it maintains a
/// binding record which dies with the process, no unbind round-trip is
/// sent for a dead process.
pub struct Breakpoint {
    pub(super) id: BreakpointId,
    pub(super) spec: BreakpointSpec,
    pub(super) bindings: HashMap<ProcessId, Binding>,
    pub(super) hit_count: u64,
    pub(super) removing: bool,
}

impl Breakpoint {
    fn new(id: BreakpointId, spec: BreakpointSpec) -> Self {
        Self {
            id,
            spec,
            bindings: HashMap::new(),
            hit_count: 0,
            removing: false,
        }
    }

    pub(super) fn overall_state(&self) -> BreakpointState {
        if self
            .bindings
            .values()
            .any(|b| b.state == BindingState::Inserted)
        {
            return BreakpointState::Inserted;
        }
        if !self.bindings.is_empty()
            && self
                .bindings
                .values()
                .all(|b| matches!(b.state, BindingState::Failed(_)))
        {
            return BreakpointState::Failed;
        }
        BreakpointState::Pending
    }

    pub(super) fn matches(&self, target: TargetId, pid: ProcessId) -> bool {
        match self.spec.scope {
            BreakpointScope::Global => true,
            BreakpointScope::Target(t) => t == target,
            BreakpointScope::Process(p) => p == pid,
        }
    }

    /// Under removal the breakpoint is discarded once its binding table
    /// drains: removes complete, pending inserts resolve, processes die.
    pub(super) fn removal_complete(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(super) fn view(&self) -> BreakpointView<'_> {
        BreakpointView {
            id: self.id,
            spec: &self.spec,
            state: self.overall_state(),
            hit_count: self.hit_count,
        }
    }

    pub(super) fn binding_state(&self, pid: ProcessId) -> Option<BindingState> {
        self.bindings.get(&pid).map(|b| b.state)
    }
}

/// Read-only breakpoint snapshot for front ends.
#[derive(Debug, Clone, Copy)]
pub struct BreakpointView<'a> {
    pub id: BreakpointId,
    pub spec: &'a BreakpointSpec,
    pub state: BreakpointState,
    pub hit_count: u64,
}

/// All breakpoints declared on the session.
#[derive(Default)]
pub(super) struct BreakpointRegistry {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    next_id: u32,
}

impl BreakpointRegistry {
    pub(super) fn declare(&mut self, spec: BreakpointSpec) -> BreakpointId {
        self.next_id += 1;
        let id = BreakpointId(self.next_id);
        self.breakpoints.insert(id, Breakpoint::new(id, spec));
        id
    }

    pub(super) fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    pub(super) fn get_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(&id)
    }

    pub(super) fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        self.breakpoints.remove(&id)
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// Drop all bindings referencing a dead process. Return breakpoints
    /// whose removal became complete because their last outstanding remove
    /// disappeared with the process.
    pub(super) fn drop_process_bindings(&mut self, pid: ProcessId) -> Vec<BreakpointId> {
        let mut discarded = vec![];
        self.breakpoints.retain(|id, bp| {
            bp.bindings.remove(&pid);
            let discard = bp.removing && bp.removal_complete();
            if discard {
                discarded.push(*id);
            }
            !discard
        });
        discarded
    }
}
