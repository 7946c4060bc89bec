use crate::client::handle::WeakHandle;
use crate::client::thread::{Thread, ThreadRegistry};
use crate::protocol::{ModuleInfo, ProcessId, ThreadId};
use strum_macros::Display;

/// How a process came under debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StartType {
    Launch,
    Attach,
    /// Launched as a component hosted by the agent. Indistinguishable
    /// from a plain launch on the wire, recorded for front ends.
    Component,
}

/// Remote process lifecycle as seen by the client.
///
/// `Starting` - the launch/attach request is still outstanding, no other
/// request may be sent to this process. `Exiting` - a detach or kill was
/// sent and the client awaits the final reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProcessState {
    Starting,
    Running,
    Exiting,
}

/// Teardown deferred because the start request is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TeardownKind {
    Detach,
    Kill,
}

/// Client mirror of an attached or launched remote process.
///
/// Owned by exactly one [`Target`](crate::client::target::Target) and
/// destroyed when a detach/kill is acknowledged or the agent reports
/// termination.
pub struct Process {
    pub(super) pid: ProcessId,
    pub(super) name: String,
    pub(super) start_type: StartType,
    pub(super) state: ProcessState,
    pub(super) handle: WeakHandle,
    pub(super) threads: ThreadRegistry,
    pub(super) modules: Vec<ModuleInfo>,
    pub(super) queued_teardown: Option<TeardownKind>,
}

impl Process {
    pub(super) fn new(
        pid: ProcessId,
        name: String,
        start_type: StartType,
        handle: WeakHandle,
    ) -> Self {
        Self {
            pid,
            name,
            start_type,
            state: ProcessState::Starting,
            handle,
            threads: ThreadRegistry::new(pid),
            modules: vec![],
            queued_teardown: None,
        }
    }

    /// Agent process id. [`ProcessId::UNASSIGNED`] until a launch reply
    /// arrives.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_type(&self) -> StartType {
        self.start_type
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Snapshot of tracked threads, ordered by thread id.
    pub fn threads(&self) -> Vec<Thread> {
        self.threads.dump()
    }

    pub fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.get(tid)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Modules the agent reported as loaded, in arrival order.
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }
}
