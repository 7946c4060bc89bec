use crate::client::breakpoint::BreakpointView;
use crate::client::target::TargetId;
use crate::protocol::{ModuleInfo, ProcessId, ThreadId, ThreadState};

/// Hooks through which a front end observes client state changes.
///
/// Every method is called from the session's execution context after the
/// client model is already updated, so implementations may immediately
/// re-query the session for rendering.
pub trait EventHook {
    /// A launch or attach completed and `pid` is now tracked under `target`.
    fn on_process_started(&self, target: TargetId, pid: ProcessId);

    /// A process stopped being tracked. `exit_code` is present when the
    /// agent reported termination and absent on detach.
    fn on_process_exited(&self, pid: ProcessId, exit_code: Option<i32>);

    /// The agent confirmed a thread run-state change.
    fn on_thread_state(&self, pid: ProcessId, tid: ThreadId, state: ThreadState);

    /// Execution stopped on a breakpoint.
    fn on_breakpoint_hit(
        &self,
        pid: ProcessId,
        tid: ThreadId,
        breakpoint: BreakpointView<'_>,
    ) -> anyhow::Result<()>;

    /// A breakpoint changed state (a binding appeared, was confirmed or
    /// rejected).
    fn on_breakpoint_update(&self, breakpoint: BreakpointView<'_>);

    /// A breakpoint finished removal and is no longer tracked.
    fn on_breakpoint_removed(&self, id: crate::protocol::BreakpointId);

    /// The agent reported a newly loaded module.
    fn on_module_loaded(&self, pid: ProcessId, module: &ModuleInfo);
}
