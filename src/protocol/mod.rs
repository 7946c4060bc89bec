//! Messages of the debug agent wire protocol.
//!
//! Every frame starts with a fixed header: transaction id, message kind and
//! payload length. Transaction id 0 is reserved for agent-initiated
//! notifications, any other value correlates exactly one request with
//! exactly one reply.

pub mod codec;

use std::fmt;
use strum_macros::{Display, FromRepr};

/// Correlates one request to its one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Agent-side process identifier (a kernel object id on the agent's platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// A launched process has no agent identifier until the launch reply
    /// arrives, 0 never names a real process.
    pub const UNASSIGNED: ProcessId = ProcessId(0);
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Agent-side thread identifier, unique within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-allocated breakpoint identifier, shared with the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread run state as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ThreadState {
    Running,
    Suspended,
    Blocked,
    Dying,
}

/// Loaded module description from a `ModuleLoaded` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base_addr: u64,
}

/// Command kinds understood by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u32)]
pub enum RequestKind {
    Launch = 1,
    Attach = 2,
    Detach = 3,
    Kill = 4,
    Resume = 5,
    Pause = 6,
    AddBreakpoint = 7,
    RemoveBreakpoint = 8,
    ReadMemory = 9,
    WriteMemory = 10,
    ListThreads = 11,
}

/// Client to agent commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Launch {
        program: String,
        args: Vec<String>,
    },
    Attach {
        pid: ProcessId,
    },
    Detach {
        pid: ProcessId,
    },
    Kill {
        pid: ProcessId,
    },
    /// Resume a single thread, or the whole process if `tid` is [`None`].
    Resume {
        pid: ProcessId,
        tid: Option<ThreadId>,
    },
    /// Pause a single thread, or the whole process if `tid` is [`None`].
    Pause {
        pid: ProcessId,
        tid: Option<ThreadId>,
    },
    AddBreakpoint {
        id: BreakpointId,
        pid: ProcessId,
        address: u64,
    },
    RemoveBreakpoint {
        id: BreakpointId,
        pid: ProcessId,
    },
    ReadMemory {
        pid: ProcessId,
        address: u64,
        size: u32,
    },
    WriteMemory {
        pid: ProcessId,
        address: u64,
        data: Vec<u8>,
    },
    ListThreads {
        pid: ProcessId,
    },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Launch { .. } => RequestKind::Launch,
            Request::Attach { .. } => RequestKind::Attach,
            Request::Detach { .. } => RequestKind::Detach,
            Request::Kill { .. } => RequestKind::Kill,
            Request::Resume { .. } => RequestKind::Resume,
            Request::Pause { .. } => RequestKind::Pause,
            Request::AddBreakpoint { .. } => RequestKind::AddBreakpoint,
            Request::RemoveBreakpoint { .. } => RequestKind::RemoveBreakpoint,
            Request::ReadMemory { .. } => RequestKind::ReadMemory,
            Request::WriteMemory { .. } => RequestKind::WriteMemory,
            Request::ListThreads { .. } => RequestKind::ListThreads,
        }
    }
}

/// Agent status code meaning success.
pub const STATUS_OK: u32 = 0;

/// Payload of a successful reply. The variant must agree with the kind of
/// the originating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    None,
    /// Launch/Attach confirmation carrying the agent process id.
    Process { pid: ProcessId },
    /// ReadMemory result.
    Memory { data: Vec<u8> },
    /// ListThreads result.
    Threads { threads: Vec<(ThreadId, ThreadState)> },
}

/// Agent reply to one request.
///
/// `status` 0 is success, any other value is a typed agent failure code and
/// the payload is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: RequestKind,
    pub status: u32,
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn ok(kind: RequestKind, payload: ReplyPayload) -> Self {
        Self {
            kind,
            status: STATUS_OK,
            payload,
        }
    }

    pub fn rejected(kind: RequestKind, status: u32) -> Self {
        debug_assert_ne!(status, STATUS_OK);
        Self {
            kind,
            status,
            payload: ReplyPayload::None,
        }
    }
}

/// Agent-initiated messages, sent with transaction id 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ProcessExited {
        pid: ProcessId,
        exit_code: i32,
    },
    ThreadStateChanged {
        pid: ProcessId,
        tid: ThreadId,
        state: ThreadState,
    },
    ModuleLoaded {
        pid: ProcessId,
        module: ModuleInfo,
    },
    BreakpointHit {
        pid: ProcessId,
        tid: ThreadId,
        breakpoint: BreakpointId,
    },
}

impl Notification {
    /// Process this notification is addressed to.
    pub fn pid(&self) -> ProcessId {
        match self {
            Notification::ProcessExited { pid, .. } => *pid,
            Notification::ThreadStateChanged { pid, .. } => *pid,
            Notification::ModuleLoaded { pid, .. } => *pid,
            Notification::BreakpointHit { pid, .. } => *pid,
        }
    }
}

/// Any decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(TransactionId, Request),
    Reply(TransactionId, Reply),
    Notification(Notification),
}
