use crate::client::handle::WeakHandle;
use crate::client::process::Process;
use std::fmt;
use strum_macros::Display;

/// Client-side target identifier. Stable for the whole session, unlike
/// process ids which change across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TargetState {
    /// No process bound.
    Empty,
    /// Launch or attach issued, awaiting agent confirmation.
    Starting,
    /// Process attached and confirmed.
    Running,
}

/// A binding slot for "a process we intend to run or have run".
///
/// The slot outlives the processes bound to it: after an exit or detach it
/// returns to [`TargetState::Empty`] and keeps its launch configuration, so
/// the same program can be started again.
pub struct Target {
    pub(super) id: TargetId,
    pub(super) state: TargetState,
    pub(super) handle: WeakHandle,
    pub(super) process: Option<Process>,
    pub(super) program: Option<String>,
    pub(super) args: Vec<String>,
}

impl Target {
    pub(super) fn new(id: TargetId, handle: WeakHandle) -> Self {
        Self {
            id,
            state: TargetState::Empty,
            handle,
            process: None,
            program: None,
            args: vec![],
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// Launch configuration kept from the last launch on this slot.
    pub fn launch_config(&self) -> Option<(&str, &[String])> {
        self.program
            .as_deref()
            .map(|program| (program, self.args.as_slice()))
    }
}
