//! Client core of a remote debugger.
//!
//! The crate mirrors remote state (targets, processes, threads,
//! breakpoints) behind a strictly asynchronous request/reply protocol: an
//! operation sends a framed request to the debug agent and registers a
//! continuation, the reply resumes it on the session's execution context.
//! Unsolicited agent notifications keep the mirror in sync.

pub mod client;
pub mod log;
pub mod protocol;
pub mod transport;

pub use client::{EventHook, Session};
