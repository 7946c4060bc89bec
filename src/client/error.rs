use crate::client::target::TargetId;
use crate::protocol::codec::DecodeError;
use crate::protocol::{BreakpointId, ProcessId, ThreadId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- session connection errors ---------------------------------
    #[error("session is not connected to a debug agent")]
    NotConnected,
    #[error("session already connected")]
    AlreadyConnected,
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- target state errors ---------------------------------------
    #[error("target {0} not found")]
    TargetNotFound(TargetId),
    #[error("start request already in flight for target {0}")]
    AlreadyStarting(TargetId),
    #[error("target {0} already holds a live process")]
    AlreadyRunning(TargetId),
    #[error("process {0} is already tracked by another target")]
    AlreadyAttached(ProcessId),

    // --------------------------------- client entity not found -----------------------------------
    #[error("process {0} is not tracked client-side")]
    NoSuchProcess(ProcessId),
    #[error("thread {1} of process {0} is not tracked client-side")]
    NoSuchThread(ProcessId, ThreadId),
    #[error("breakpoint {0} not found")]
    NoSuchBreakpoint(BreakpointId),
    #[error("process {0} is not in a running state")]
    ProcessNotRunning(ProcessId),

    // --------------------------------- request completion errors ---------------------------------
    #[error("agent rejected request with status code {0}")]
    AgentRejected(u32),
    #[error("request cancelled by session disconnect")]
    Cancelled,
    #[error("reply payload does not match request kind")]
    UnexpectedReply,

    // --------------------------------- wire errors -----------------------------------------------
    #[error(transparent)]
    Decode(#[from] DecodeError),

    // --------------------------------- third party errors ----------------------------------------
    #[error("hook: {0}")]
    Hook(anyhow::Error),
}

impl Error {
    /// Return a hint to an interface - continue debugging after error or stop whole process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotConnected => false,
            Error::AlreadyConnected => false,
            Error::IO(_) => false,
            Error::TargetNotFound(_) => false,
            Error::AlreadyStarting(_) => false,
            Error::AlreadyRunning(_) => false,
            Error::AlreadyAttached(_) => false,
            Error::NoSuchProcess(_) => false,
            Error::NoSuchThread(_, _) => false,
            Error::NoSuchBreakpoint(_) => false,
            Error::ProcessNotRunning(_) => false,
            Error::AgentRejected(_) => false,
            Error::Cancelled => false,
            Error::UnexpectedReply => false,
            Error::Hook(_) => false,

            // a framed stream that no longer decodes cannot be resynchronized
            Error::Decode(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "client", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "client", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
