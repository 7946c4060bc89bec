use crate::client::handle::{HandleRegistry, ObjectRef, WeakHandle};
use crate::protocol::{ProcessId, ThreadId, ThreadState};
use std::collections::HashMap;

/// Client mirror of one schedulable unit inside a remote process.
///
/// Run state changes only when the agent confirms them with a
/// `ThreadStateChanged` notification, there are no optimistic client-side
/// transitions.
#[derive(Clone)]
pub struct Thread {
    pub tid: ThreadId,
    pub state: ThreadState,
    pub(super) handle: WeakHandle,
}

/// Threads of a single process.
pub(super) struct ThreadRegistry {
    pid: ProcessId,
    state: HashMap<ThreadId, Thread>,
}

impl ThreadRegistry {
    pub(super) fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            state: HashMap::new(),
        }
    }

    /// Called once, when a launch reply assigns the real process id.
    pub(super) fn set_pid(&mut self, pid: ProcessId) {
        debug_assert!(self.state.is_empty());
        self.pid = pid;
    }

    /// Start tracking a thread first seen in an agent message.
    pub(super) fn register(
        &mut self,
        handles: &mut HandleRegistry,
        tid: ThreadId,
        state: ThreadState,
    ) {
        let handle = handles.register(ObjectRef::Thread(self.pid, tid));
        self.state.insert(tid, Thread { tid, state, handle });
    }

    /// Stop tracking a thread, invalidating its handle.
    pub(super) fn remove(&mut self, handles: &mut HandleRegistry, tid: ThreadId) {
        if let Some(thread) = self.state.remove(&tid) {
            handles.release(thread.handle);
        }
    }

    /// Apply an agent-confirmed state change. Threads unknown so far are
    /// registered on the fly (the agent may report a thread before the
    /// client ever listed it).
    pub(super) fn apply(
        &mut self,
        handles: &mut HandleRegistry,
        tid: ThreadId,
        state: ThreadState,
    ) {
        match self.state.get_mut(&tid) {
            Some(thread) => thread.state = state,
            None => self.register(handles, tid, state),
        }
    }

    pub(super) fn get(&self, tid: ThreadId) -> Option<&Thread> {
        self.state.get(&tid)
    }

    /// Replace the tracked set with a `ListThreads` reply: threads missing
    /// from the reply are pruned, new ones registered, survivors updated.
    pub(super) fn reconcile(
        &mut self,
        handles: &mut HandleRegistry,
        threads: &[(ThreadId, ThreadState)],
    ) {
        let gone: Vec<ThreadId> = self
            .state
            .keys()
            .filter(|tid| !threads.iter().any(|(t, _)| t == *tid))
            .copied()
            .collect();
        for tid in gone {
            self.remove(handles, tid);
        }
        for (tid, state) in threads {
            self.apply(handles, *tid, *state);
        }
    }

    /// Drop every thread, invalidating handles.
    pub(super) fn clear(&mut self, handles: &mut HandleRegistry) {
        for (_, thread) in self.state.drain() {
            handles.release(thread.handle);
        }
    }

    /// Snapshot of all tracked threads, ordered by thread id.
    pub(super) fn dump(&self) -> Vec<Thread> {
        let mut threads: Vec<Thread> = self.state.values().cloned().collect();
        threads.sort_by_key(|t| t.tid);
        threads
    }

    pub(super) fn len(&self) -> usize {
        self.state.len()
    }
}
