//! Client-side debugger state.
//!
//! [`Session`] is the root: it owns the single agent connection, allocates
//! transaction ids, routes replies and notifications, and owns the target
//! hierarchy. All state mutation happens on one logical execution context:
//! a call either returns immediately or registers a continuation that the
//! transport pump resumes later, so no locks are needed and no callback
//! ever runs recursively from inside the call that issued its request.

pub mod breakpoint;
pub mod error;
pub mod handle;
pub mod observer;
pub mod process;
pub mod settings;
pub mod target;
pub mod thread;

pub use error::Error;
pub use observer::EventHook;

use crate::client::breakpoint::{
    Binding, BindingState, BreakpointRegistry, BreakpointSpec, BreakpointView,
};
use crate::client::handle::{HandleRegistry, ObjectRef, WeakHandle};
use crate::client::process::{Process, ProcessState, StartType, TeardownKind};
use crate::client::target::{Target, TargetId, TargetState};
use crate::client::thread::Thread;
use crate::protocol::codec;
use crate::protocol::{
    BreakpointId, Message, Notification, ProcessId, Reply, ReplyPayload, Request, ThreadId,
    ThreadState, TransactionId, STATUS_OK,
};
use crate::transport::Transport;
use crate::{ws_debug, ws_info, ws_warn};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io;
use std::mem;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Terminal result of a pending request.
enum Outcome {
    Reply(Reply),
    Cancelled,
}

type Continuation<H> = Box<dyn FnOnce(&mut Session<H>, Outcome) + 'static>;

/// One outstanding request. The continuation fires at most once: with the
/// reply, or with a cancellation at disconnect. If the issuer dies first
/// the completion is suppressed entirely.
struct PendingRequest<H: EventHook> {
    issuer: WeakHandle,
    continuation: Continuation<H>,
}

enum StartKind {
    Launch {
        program: String,
        args: Vec<String>,
        start_type: StartType,
    },
    Attach {
        pid: ProcessId,
    },
}

/// What an insert reply leaves to do after the binding table is updated.
enum BindingFollowUp {
    Announce,
    Chase,
    Discard,
    Nothing,
}

/// Root of the client state, exactly one per debugging instance.
pub struct Session<H: EventHook> {
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    next_txid: u64,
    /// Pending table in insertion order. Transaction ids grow
    /// monotonically, so iteration order is transaction-id order.
    pending: IndexMap<TransactionId, PendingRequest<H>>,
    handles: HandleRegistry,
    targets: BTreeMap<TargetId, Target>,
    next_target: u32,
    breakpoints: BreakpointRegistry,
    hooks: H,
}

impl<H: EventHook> Session<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            state: SessionState::Disconnected,
            transport: None,
            // 0 is reserved for notifications
            next_txid: 1,
            pending: IndexMap::new(),
            handles: HandleRegistry::new(),
            targets: BTreeMap::new(),
            next_target: 0,
            breakpoints: BreakpointRegistry::default(),
            hooks,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Number of requests awaiting a reply.
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// Bind a transport and enable request dispatch.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> Result<(), Error> {
        if self.state == SessionState::Connected {
            return Err(Error::AlreadyConnected);
        }
        self.transport = Some(transport);
        self.state = SessionState::Connected;
        ws_info!(target: "client", "session connected");
        Ok(())
    }

    /// Drop the connection.
    ///
    /// Every outstanding request completes with a cancellation, in
    /// transaction-id order, exactly once each. Live processes cannot be
    /// tracked without a connection and are destroyed; targets return to
    /// `Empty` and keep their launch configuration, breakpoint
    /// declarations survive for the next connection.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        ws_info!(target: "client", "session disconnected");
        self.state = SessionState::Disconnected;
        self.transport = None;

        let pending = mem::take(&mut self.pending);
        for (txid, request) in pending {
            if self.handles.resolve(request.issuer).is_none() {
                ws_debug!(target: "client", "issuer of transaction {txid} is gone, cancellation dropped");
                continue;
            }
            (request.continuation)(self, Outcome::Cancelled);
        }

        let targets: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| t.process.is_some())
            .map(|t| t.id)
            .collect();
        for target_id in targets {
            self.destroy_process(target_id, None);
        }
    }

    /// Read and dispatch one inbound frame. A transport error is treated
    /// as a connection drop and cancels all outstanding requests.
    pub fn poll_transport(&mut self) -> Result<(), Error> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::NotConnected);
        };
        match transport.recv() {
            Ok(frame) => self.on_frame(&frame),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                ws_warn!(target: "client", "transport dropped: {e}");
                self.disconnect();
                Err(Error::IO(e))
            }
        }
    }

    /// Single entry point for inbound frames.
    pub fn on_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        match codec::decode(frame)? {
            Message::Reply(txid, reply) => {
                self.on_reply(txid, reply);
                Ok(())
            }
            Message::Notification(notification) => self.on_notification(notification),
            Message::Request(txid, request) => {
                ws_warn!(target: "protocol", "agent sent a request frame ({}, transaction {txid}), dropped", request.kind());
                Ok(())
            }
        }
    }

    // ------------------------------- dispatch ----------------------------------------------------

    /// Allocate a transaction id, register the continuation and forward
    /// the framed request. Never blocks and never invokes the continuation
    /// recursively: it resumes from the transport pump.
    fn send_request(
        &mut self,
        issuer: WeakHandle,
        request: Request,
        continuation: Continuation<H>,
    ) -> Result<TransactionId, Error> {
        if self.state != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::NotConnected);
        };

        let txid = TransactionId(self.next_txid);
        let frame = codec::encode_request(txid, &request);
        transport.send(&frame)?;
        self.next_txid += 1;
        self.pending.insert(
            txid,
            PendingRequest {
                issuer,
                continuation,
            },
        );
        ws_debug!(target: "protocol", "request {} sent, transaction {txid}", request.kind());
        Ok(txid)
    }

    fn on_reply(&mut self, txid: TransactionId, reply: Reply) {
        let Some(request) = self.pending.shift_remove(&txid) else {
            ws_debug!(target: "client", "reply for unknown transaction {txid}, dropped");
            return;
        };
        // a reply must never run against a destroyed issuer
        if self.handles.resolve(request.issuer).is_none() {
            ws_debug!(target: "client", "issuer of transaction {txid} is gone, reply dropped");
            return;
        }
        ws_debug!(target: "protocol", "reply {} for transaction {txid}, status {}", reply.kind, reply.status);
        (request.continuation)(self, Outcome::Reply(reply));
    }

    /// Notifications are routed by process identity. A notification for a
    /// process that is no longer tracked is expected during detach races
    /// and silently dropped.
    fn on_notification(&mut self, notification: Notification) -> Result<(), Error> {
        match notification {
            Notification::ProcessExited { pid, exit_code } => {
                let Some(target_id) = self.target_of(pid) else {
                    ws_debug!(target: "client", "exit notification for untracked process {pid}, dropped");
                    return Ok(());
                };
                self.destroy_process(target_id, Some(exit_code));
                Ok(())
            }
            Notification::ThreadStateChanged { pid, tid, state } => {
                let Some(process) = Self::find_process_mut(&mut self.targets, pid) else {
                    ws_debug!(target: "client", "thread notification for untracked process {pid}, dropped");
                    return Ok(());
                };
                process.threads.apply(&mut self.handles, tid, state);
                self.hooks.on_thread_state(pid, tid, state);
                if state == ThreadState::Dying {
                    if let Some(process) = Self::find_process_mut(&mut self.targets, pid) {
                        process.threads.remove(&mut self.handles, tid);
                    }
                }
                Ok(())
            }
            Notification::ModuleLoaded { pid, module } => {
                let Some(process) = Self::find_process_mut(&mut self.targets, pid) else {
                    ws_debug!(target: "client", "module notification for untracked process {pid}, dropped");
                    return Ok(());
                };
                process.modules.push(module.clone());
                self.hooks.on_module_loaded(pid, &module);
                Ok(())
            }
            Notification::BreakpointHit {
                pid,
                tid,
                breakpoint,
            } => {
                if Self::find_process(&self.targets, pid).is_none() {
                    ws_debug!(target: "client", "hit notification for untracked process {pid}, dropped");
                    return Ok(());
                }
                let Some(bp) = self.breakpoints.get_mut(breakpoint) else {
                    ws_debug!(target: "client", "hit of unknown breakpoint {breakpoint}, dropped");
                    return Ok(());
                };
                bp.hit_count += 1;
                let view = bp.view();
                self.hooks
                    .on_breakpoint_hit(pid, tid, view)
                    .map_err(Error::Hook)
            }
        }
    }

    // ------------------------------- targets -----------------------------------------------------

    /// Create an empty target slot.
    pub fn create_target(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        let handle = self.handles.register(ObjectRef::Target(id));
        self.targets.insert(id, Target::new(id, handle));
        id
    }

    /// Discard an empty target slot.
    pub fn remove_target(&mut self, id: TargetId) -> Result<(), Error> {
        match self.targets.get(&id).map(|t| t.state) {
            None => Err(Error::TargetNotFound(id)),
            Some(TargetState::Starting) => Err(Error::AlreadyStarting(id)),
            Some(TargetState::Running) => Err(Error::AlreadyRunning(id)),
            Some(TargetState::Empty) => {
                if let Some(target) = self.targets.remove(&id) {
                    self.handles.release(target.handle);
                }
                Ok(())
            }
        }
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        Self::find_process(&self.targets, pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.targets.values().filter_map(|t| t.process.as_ref())
    }

    // ------------------------------- process lifecycle -------------------------------------------

    /// Ask the agent to launch a program under the given target.
    ///
    /// The target walks `Empty -> Starting` now and `Starting -> Running`
    /// when the agent confirms; `on_done` receives the agent process id or
    /// the failure.
    pub fn launch<F>(
        &mut self,
        target_id: TargetId,
        program: impl Into<String>,
        args: Vec<String>,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<ProcessId, Error>) + 'static,
    {
        self.start(
            target_id,
            StartKind::Launch {
                program: program.into(),
                args,
                start_type: StartType::Launch,
            },
            on_done,
        )
    }

    /// Launch a program hosted as a component of the agent. On the wire
    /// this is an ordinary launch request; the client records the start
    /// flavor so front ends can tell the two apart.
    pub fn launch_component<F>(
        &mut self,
        target_id: TargetId,
        program: impl Into<String>,
        args: Vec<String>,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<ProcessId, Error>) + 'static,
    {
        self.start(
            target_id,
            StartKind::Launch {
                program: program.into(),
                args,
                start_type: StartType::Component,
            },
            on_done,
        )
    }

    /// Ask the agent to attach to an already running process.
    pub fn attach<F>(
        &mut self,
        target_id: TargetId,
        pid: ProcessId,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<ProcessId, Error>) + 'static,
    {
        self.start(target_id, StartKind::Attach { pid }, on_done)
    }

    fn start<F>(&mut self, target_id: TargetId, kind: StartKind, on_done: F) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<ProcessId, Error>) + 'static,
    {
        if self.state != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        {
            let target = self
                .targets
                .get(&target_id)
                .ok_or(Error::TargetNotFound(target_id))?;
            match target.state {
                TargetState::Starting => return Err(Error::AlreadyStarting(target_id)),
                TargetState::Running => return Err(Error::AlreadyRunning(target_id)),
                TargetState::Empty => {}
            }
        }

        let (pid, name, start_type, request) = match kind {
            StartKind::Launch {
                program,
                args,
                start_type,
            } => {
                let request = Request::Launch {
                    program: program.clone(),
                    args: args.clone(),
                };
                if let Some(target) = self.targets.get_mut(&target_id) {
                    target.program = Some(program.clone());
                    target.args = args;
                }
                (ProcessId::UNASSIGNED, program, start_type, request)
            }
            StartKind::Attach { pid } => {
                if self.target_of(pid).is_some() {
                    return Err(Error::AlreadyAttached(pid));
                }
                (
                    pid,
                    format!("pid-{pid}"),
                    StartType::Attach,
                    Request::Attach { pid },
                )
            }
        };

        let handle = self.handles.register(ObjectRef::Process(pid));
        let sent = self.send_request(
            handle,
            request,
            Box::new(move |sess, outcome| match outcome {
                Outcome::Cancelled => {
                    sess.destroy_process(target_id, None);
                    on_done(sess, Err(Error::Cancelled));
                }
                Outcome::Reply(reply) if reply.status != STATUS_OK => {
                    let status = reply.status;
                    sess.destroy_process(target_id, None);
                    on_done(sess, Err(Error::AgentRejected(status)));
                }
                Outcome::Reply(Reply {
                    payload: ReplyPayload::Process { pid },
                    ..
                }) => {
                    sess.promote_process(target_id, pid);
                    on_done(sess, Ok(pid));
                }
                Outcome::Reply(_) => {
                    ws_warn!(target: "client", "start reply with unexpected payload, target {target_id}");
                    sess.destroy_process(target_id, None);
                    on_done(sess, Err(Error::UnexpectedReply));
                }
            }),
        );

        match sent {
            Ok(txid) => {
                if let Some(target) = self.targets.get_mut(&target_id) {
                    target.state = TargetState::Starting;
                    target.process = Some(Process::new(pid, name, start_type, handle));
                }
                Ok(txid)
            }
            Err(e) => {
                self.handles.release(handle);
                Err(e)
            }
        }
    }

    /// A start reply confirmed the process: assign the agent pid, flush a
    /// queued teardown or evaluate breakpoints against the new process.
    fn promote_process(&mut self, target_id: TargetId, pid: ProcessId) {
        let (handle, queued) = {
            let Some(target) = self.targets.get_mut(&target_id) else {
                return;
            };
            let Some(process) = target.process.as_mut() else {
                return;
            };
            process.pid = pid;
            process.threads.set_pid(pid);
            process.state = ProcessState::Running;
            target.state = TargetState::Running;
            (process.handle, process.queued_teardown.take())
        };
        self.handles.rebind(handle, ObjectRef::Process(pid));
        ws_info!(target: "client", "process {pid} started (target {target_id})");
        self.hooks.on_process_started(target_id, pid);

        match queued {
            Some(kind) => {
                crate::weak_error!(self.teardown(target_id, kind), "queued teardown:");
            }
            None => self.bind_breakpoints_for(target_id, pid),
        }
    }

    /// Detach from a process. Returns `Ok(None)` if the teardown was
    /// queued behind an outstanding start request or is already on its
    /// way.
    pub fn detach(&mut self, pid: ProcessId) -> Result<Option<TransactionId>, Error> {
        let target_id = self.target_of(pid).ok_or(Error::NoSuchProcess(pid))?;
        self.teardown(target_id, TeardownKind::Detach)
    }

    /// Kill a process. Queueing semantics match [`Session::detach`].
    pub fn kill(&mut self, pid: ProcessId) -> Result<Option<TransactionId>, Error> {
        let target_id = self.target_of(pid).ok_or(Error::NoSuchProcess(pid))?;
        self.teardown(target_id, TeardownKind::Kill)
    }

    /// Detach whatever process is bound to the target, even one still
    /// starting (whose pid is not known yet). A teardown on an empty
    /// target is a no-op.
    pub fn detach_target(&mut self, target_id: TargetId) -> Result<Option<TransactionId>, Error> {
        self.teardown(target_id, TeardownKind::Detach)
    }

    /// Kill counterpart of [`Session::detach_target`].
    pub fn kill_target(&mut self, target_id: TargetId) -> Result<Option<TransactionId>, Error> {
        self.teardown(target_id, TeardownKind::Kill)
    }

    /// A teardown is never sent while the start request is outstanding:
    /// it is queued on the process and applied once `Running` is reached.
    fn teardown(
        &mut self,
        target_id: TargetId,
        kind: TeardownKind,
    ) -> Result<Option<TransactionId>, Error> {
        let (pid, handle) = {
            let target = self
                .targets
                .get_mut(&target_id)
                .ok_or(Error::TargetNotFound(target_id))?;
            let Some(process) = target.process.as_mut() else {
                return Ok(None);
            };
            match process.state {
                ProcessState::Starting => {
                    process.queued_teardown = Some(kind);
                    return Ok(None);
                }
                ProcessState::Exiting => return Ok(None),
                ProcessState::Running => {}
            }
            process.state = ProcessState::Exiting;
            (process.pid, process.handle)
        };

        let request = match kind {
            TeardownKind::Detach => Request::Detach { pid },
            TeardownKind::Kill => Request::Kill { pid },
        };
        let sent = self.send_request(
            handle,
            request,
            Box::new(move |sess, outcome| match outcome {
                // disconnect destroys every process right after cancellations
                Outcome::Cancelled => {}
                Outcome::Reply(reply) => {
                    if reply.status != STATUS_OK {
                        ws_warn!(target: "client", "agent rejected teardown of process {pid}: status {}", reply.status);
                    }
                    sess.destroy_process(target_id, None);
                }
            }),
        );
        match sent {
            Ok(txid) => Ok(Some(txid)),
            Err(e) => {
                if let Some(process) = Self::find_process_mut(&mut self.targets, pid) {
                    process.state = ProcessState::Running;
                }
                Err(e)
            }
        }
    }

    /// Remove a process mirror and everything it owns: threads are
    /// released, breakpoint bindings are discarded without any agent
    /// round-trip, every outstanding handle expires.
    fn destroy_process(&mut self, target_id: TargetId, exit_code: Option<i32>) {
        let mut process = {
            let Some(target) = self.targets.get_mut(&target_id) else {
                return;
            };
            let Some(process) = target.process.take() else {
                return;
            };
            target.state = TargetState::Empty;
            process
        };

        process.threads.clear(&mut self.handles);
        self.handles.release(process.handle);
        let discarded = self.breakpoints.drop_process_bindings(process.pid);
        for id in discarded {
            self.hooks.on_breakpoint_removed(id);
        }
        ws_info!(target: "client", "process {} destroyed", process.pid);

        // a process that never reached `Running` was never announced
        if process.state != ProcessState::Starting {
            self.hooks.on_process_exited(process.pid, exit_code);
        }
    }

    // ------------------------------- run control -------------------------------------------------

    /// Resume a thread, or the whole process if `tid` is [`None`]. The
    /// client-side thread state changes only when the agent confirms with
    /// a notification, never optimistically.
    pub fn resume<F>(
        &mut self,
        pid: ProcessId,
        tid: Option<ThreadId>,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<(), Error>) + 'static,
    {
        let handle = self.running_process_handle(pid, tid)?;
        self.send_request(
            handle,
            Request::Resume { pid, tid },
            Box::new(move |sess, outcome| on_done(sess, unit_result(outcome))),
        )
    }

    /// Pause counterpart of [`Session::resume`].
    pub fn pause<F>(
        &mut self,
        pid: ProcessId,
        tid: Option<ThreadId>,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<(), Error>) + 'static,
    {
        let handle = self.running_process_handle(pid, tid)?;
        self.send_request(
            handle,
            Request::Pause { pid, tid },
            Box::new(move |sess, outcome| on_done(sess, unit_result(outcome))),
        )
    }

    pub fn read_memory<F>(
        &mut self,
        pid: ProcessId,
        address: u64,
        size: u32,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<Vec<u8>, Error>) + 'static,
    {
        let handle = self.running_process_handle(pid, None)?;
        self.send_request(
            handle,
            Request::ReadMemory { pid, address, size },
            Box::new(move |sess, outcome| {
                let res = match outcome {
                    Outcome::Cancelled => Err(Error::Cancelled),
                    Outcome::Reply(reply) if reply.status != STATUS_OK => {
                        Err(Error::AgentRejected(reply.status))
                    }
                    Outcome::Reply(Reply {
                        payload: ReplyPayload::Memory { data },
                        ..
                    }) => Ok(data),
                    Outcome::Reply(_) => Err(Error::UnexpectedReply),
                };
                on_done(sess, res);
            }),
        )
    }

    pub fn write_memory<F>(
        &mut self,
        pid: ProcessId,
        address: u64,
        data: Vec<u8>,
        on_done: F,
    ) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<(), Error>) + 'static,
    {
        let handle = self.running_process_handle(pid, None)?;
        self.send_request(
            handle,
            Request::WriteMemory { pid, address, data },
            Box::new(move |sess, outcome| on_done(sess, unit_result(outcome))),
        )
    }

    /// Fetch the thread list of a process and reconcile the local mirror
    /// with it: threads missing from the reply are pruned, new ones
    /// registered.
    pub fn list_threads<F>(&mut self, pid: ProcessId, on_done: F) -> Result<TransactionId, Error>
    where
        F: FnOnce(&mut Session<H>, Result<Vec<Thread>, Error>) + 'static,
    {
        let handle = self.running_process_handle(pid, None)?;
        self.send_request(
            handle,
            Request::ListThreads { pid },
            Box::new(move |sess, outcome| {
                let res = match outcome {
                    Outcome::Cancelled => Err(Error::Cancelled),
                    Outcome::Reply(reply) if reply.status != STATUS_OK => {
                        Err(Error::AgentRejected(reply.status))
                    }
                    Outcome::Reply(Reply {
                        payload: ReplyPayload::Threads { threads },
                        ..
                    }) => Ok(threads),
                    Outcome::Reply(_) => Err(Error::UnexpectedReply),
                };
                match res {
                    Ok(threads) => {
                        let dump = match Self::find_process_mut(&mut sess.targets, pid) {
                            Some(process) => {
                                process.threads.reconcile(&mut sess.handles, &threads);
                                Some(process.threads.dump())
                            }
                            None => None,
                        };
                        match dump {
                            Some(dump) => on_done(sess, Ok(dump)),
                            None => on_done(sess, Err(Error::NoSuchProcess(pid))),
                        }
                    }
                    Err(e) => on_done(sess, Err(e)),
                }
            }),
        )
    }

    // ------------------------------- breakpoints -------------------------------------------------

    /// Declare a breakpoint. For every currently live process in scope an
    /// insert request is issued; each per-process binding succeeds or
    /// fails independently. A breakpoint declared before any process
    /// exists stays `Pending` and binds automatically once a matching
    /// process starts.
    pub fn add_breakpoint(&mut self, spec: BreakpointSpec) -> BreakpointId {
        let id = self.breakpoints.declare(spec);
        ws_info!(target: "client", "breakpoint {id} declared");
        let candidates = self.matching_processes(id);
        let bound = !candidates.is_empty();
        for (pid, address) in candidates {
            self.insert_binding(id, pid, address);
        }
        if !bound {
            if let Some(bp) = self.breakpoints.get(id) {
                self.hooks.on_breakpoint_update(bp.view());
            }
        }
        id
    }

    /// Remove a breakpoint: a remove request is issued for every inserted
    /// binding, the declaration is discarded once all of them complete or
    /// their processes disappear, whichever comes first. A binding whose
    /// insert is still in flight keeps the declaration alive until its
    /// insert reply resolves it.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<(), Error> {
        let (complete, to_remove): (bool, Vec<ProcessId>) = {
            let bp = self
                .breakpoints
                .get_mut(id)
                .ok_or(Error::NoSuchBreakpoint(id))?;
            if bp.removing {
                return Ok(());
            }
            bp.removing = true;
            // failed bindings need no agent round-trip; pending ones are
            // resolved by their insert reply
            bp.bindings
                .retain(|_, b| !matches!(b.state, BindingState::Failed(_)));
            let to_remove = bp
                .bindings
                .iter_mut()
                .filter(|(_, b)| b.state == BindingState::Inserted)
                .map(|(pid, b)| {
                    b.remove_inflight = true;
                    *pid
                })
                .collect();
            (bp.removal_complete(), to_remove)
        };

        if complete {
            self.breakpoints.remove(id);
            self.hooks.on_breakpoint_removed(id);
            return Ok(());
        }
        for pid in to_remove {
            self.send_remove(id, pid);
        }
        Ok(())
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<BreakpointView<'_>> {
        self.breakpoints.get(id).map(|bp| bp.view())
    }

    pub fn breakpoints(&self) -> Vec<BreakpointView<'_>> {
        self.breakpoints.iter().map(|bp| bp.view()).collect()
    }

    /// State of one per-process binding, if it exists.
    pub fn breakpoint_binding(
        &self,
        id: BreakpointId,
        pid: ProcessId,
    ) -> Option<BindingState> {
        self.breakpoints.get(id)?.binding_state(pid)
    }

    /// Live processes a declaration applies to right now. A process whose
    /// start is unconfirmed is skipped; it picks the declaration up when
    /// it reaches `Running`.
    fn matching_processes(&self, id: BreakpointId) -> Vec<(ProcessId, u64)> {
        let Some(bp) = self.breakpoints.get(id) else {
            return vec![];
        };
        self.targets
            .values()
            .filter_map(|t| t.process.as_ref().map(|p| (t.id, p)))
            .filter(|(target_id, p)| {
                p.state == ProcessState::Running && bp.matches(*target_id, p.pid)
            })
            .map(|(_, p)| (p.pid, bp.spec.address))
            .collect()
    }

    /// Evaluate all declarations against a process that just reached
    /// `Running`.
    fn bind_breakpoints_for(&mut self, target_id: TargetId, pid: ProcessId) {
        let candidates: Vec<(BreakpointId, u64)> = self
            .breakpoints
            .iter()
            .filter(|bp| {
                !bp.removing && !bp.bindings.contains_key(&pid) && bp.matches(target_id, pid)
            })
            .map(|bp| (bp.id, bp.spec.address))
            .collect();
        for (id, address) in candidates {
            self.insert_binding(id, pid, address);
        }
    }

    fn insert_binding(&mut self, id: BreakpointId, pid: ProcessId, address: u64) {
        let Some(issuer) = Self::find_process(&self.targets, pid).map(|p| p.handle) else {
            return;
        };
        let sent = self.send_request(
            issuer,
            Request::AddBreakpoint { id, pid, address },
            Box::new(move |sess, outcome| {
                let Outcome::Reply(reply) = outcome else {
                    return;
                };
                let inserted = reply.status == STATUS_OK;
                let follow_up = {
                    let Some(bp) = sess.breakpoints.get_mut(id) else {
                        ws_debug!(target: "client", "insert reply for unknown breakpoint {id}, dropped");
                        return;
                    };
                    let Some(binding) = bp.bindings.get_mut(&pid) else {
                        return;
                    };
                    binding.state = if inserted {
                        BindingState::Inserted
                    } else {
                        BindingState::Failed(reply.status)
                    };
                    if !bp.removing {
                        BindingFollowUp::Announce
                    } else if inserted {
                        // an insert that lands mid-removal is chased with a remove
                        binding.remove_inflight = true;
                        BindingFollowUp::Chase
                    } else {
                        bp.bindings.remove(&pid);
                        if bp.removal_complete() {
                            BindingFollowUp::Discard
                        } else {
                            BindingFollowUp::Nothing
                        }
                    }
                };
                match follow_up {
                    BindingFollowUp::Announce => {
                        if let Some(bp) = sess.breakpoints.get(id) {
                            sess.hooks.on_breakpoint_update(bp.view());
                        }
                    }
                    BindingFollowUp::Chase => sess.send_remove(id, pid),
                    BindingFollowUp::Discard => {
                        sess.breakpoints.remove(id);
                        sess.hooks.on_breakpoint_removed(id);
                    }
                    BindingFollowUp::Nothing => {}
                }
            }),
        );
        match sent {
            Ok(_) => {
                if let Some(bp) = self.breakpoints.get_mut(id) {
                    bp.bindings.insert(pid, Binding::pending());
                }
                if let Some(bp) = self.breakpoints.get(id) {
                    self.hooks.on_breakpoint_update(bp.view());
                }
            }
            Err(e) => {
                ws_warn!(target: "client", "breakpoint {id} insert into process {pid} skipped: {e}")
            }
        }
    }

    fn send_remove(&mut self, id: BreakpointId, pid: ProcessId) {
        let Some(issuer) = Self::find_process(&self.targets, pid).map(|p| p.handle) else {
            return;
        };
        let sent = self.send_request(
            issuer,
            Request::RemoveBreakpoint { id, pid },
            Box::new(move |sess, outcome| {
                let Outcome::Reply(reply) = outcome else {
                    return;
                };
                if reply.status != STATUS_OK {
                    ws_warn!(target: "client", "agent rejected removal of breakpoint {id}: status {}", reply.status);
                }
                let discard = {
                    let Some(bp) = sess.breakpoints.get_mut(id) else {
                        return;
                    };
                    bp.bindings.remove(&pid);
                    bp.removing && bp.removal_complete()
                };
                if discard {
                    sess.breakpoints.remove(id);
                    sess.hooks.on_breakpoint_removed(id);
                }
            }),
        );
        if let Err(e) = sent {
            ws_warn!(target: "client", "breakpoint {id} removal from process {pid} skipped: {e}");
        }
    }

    // ------------------------------- lookup helpers ----------------------------------------------

    fn target_of(&self, pid: ProcessId) -> Option<TargetId> {
        if pid == ProcessId::UNASSIGNED {
            return None;
        }
        self.targets
            .values()
            .find(|t| t.process.as_ref().is_some_and(|p| p.pid == pid))
            .map(|t| t.id)
    }

    fn find_process(targets: &BTreeMap<TargetId, Target>, pid: ProcessId) -> Option<&Process> {
        if pid == ProcessId::UNASSIGNED {
            return None;
        }
        targets
            .values()
            .filter_map(|t| t.process.as_ref())
            .find(|p| p.pid == pid)
    }

    fn find_process_mut(
        targets: &mut BTreeMap<TargetId, Target>,
        pid: ProcessId,
    ) -> Option<&mut Process> {
        if pid == ProcessId::UNASSIGNED {
            return None;
        }
        targets
            .values_mut()
            .filter_map(|t| t.process.as_mut())
            .find(|p| p.pid == pid)
    }

    fn running_process_handle(
        &self,
        pid: ProcessId,
        tid: Option<ThreadId>,
    ) -> Result<WeakHandle, Error> {
        let process = Self::find_process(&self.targets, pid).ok_or(Error::NoSuchProcess(pid))?;
        if process.state != ProcessState::Running {
            return Err(Error::ProcessNotRunning(pid));
        }
        if let Some(tid) = tid {
            if process.thread(tid).is_none() {
                return Err(Error::NoSuchThread(pid, tid));
            }
        }
        Ok(process.handle)
    }
}

fn unit_result(outcome: Outcome) -> Result<(), Error> {
    match outcome {
        Outcome::Cancelled => Err(Error::Cancelled),
        Outcome::Reply(reply) if reply.status != STATUS_OK => {
            Err(Error::AgentRejected(reply.status))
        }
        Outcome::Reply(_) => Ok(()),
    }
}
