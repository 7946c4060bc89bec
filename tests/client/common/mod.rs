use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use wirestalker::client::breakpoint::BreakpointState;
use wirestalker::client::breakpoint::BreakpointView;
use wirestalker::client::target::TargetId;
use wirestalker::client::{EventHook, Session};
use wirestalker::protocol::codec;
use wirestalker::protocol::{
    BreakpointId, Message, ModuleInfo, Notification, ProcessId, Reply, ReplyPayload, Request,
    RequestKind, ThreadId, ThreadState, TransactionId,
};
use wirestalker::transport::Transport;

/// Both ends of an in-memory frame pipe. The test holds the [`Wire`] and
/// plays the agent: it inspects what the client sent and queues frames for
/// the client to receive.
#[derive(Clone, Default)]
pub struct Wire {
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
    inbound: Rc<RefCell<VecDeque<Vec<u8>>>>,
}

struct MockTransport {
    wire: Wire,
}

impl Transport for MockTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.wire.sent.borrow_mut().push(frame.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.wire
            .inbound
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }
}

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(MockTransport { wire: self.clone() })
    }

    pub fn push_inbound(&self, frame: &[u8]) {
        self.inbound.borrow_mut().push_back(frame.to_vec());
    }

    /// Decode and drain every request the client sent so far.
    pub fn take_requests(&self) -> Vec<(TransactionId, Request)> {
        self.sent
            .borrow_mut()
            .drain(..)
            .map(|frame| match codec::decode(&frame).expect("sent frame should decode") {
                Message::Request(txid, request) => (txid, request),
                other => panic!("client sent a non-request frame: {other:?}"),
            })
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }
}

/// Everything the hooks reported, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProcessStarted(TargetId, ProcessId),
    ProcessExited(ProcessId, Option<i32>),
    ThreadState(ProcessId, ThreadId, ThreadState),
    BreakpointHit(ProcessId, ThreadId, BreakpointId),
    BreakpointUpdate(BreakpointId, BreakpointState),
    BreakpointRemoved(BreakpointId),
    ModuleLoaded(ProcessId, String),
}

#[derive(Clone, Default)]
pub struct RecordingHooks {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingHooks {
    pub fn take(&self) -> Vec<Event> {
        self.events.borrow_mut().drain(..).collect()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl EventHook for RecordingHooks {
    fn on_process_started(&self, target: TargetId, pid: ProcessId) {
        self.push(Event::ProcessStarted(target, pid));
    }

    fn on_process_exited(&self, pid: ProcessId, exit_code: Option<i32>) {
        self.push(Event::ProcessExited(pid, exit_code));
    }

    fn on_thread_state(&self, pid: ProcessId, tid: ThreadId, state: ThreadState) {
        self.push(Event::ThreadState(pid, tid, state));
    }

    fn on_breakpoint_hit(
        &self,
        pid: ProcessId,
        tid: ThreadId,
        breakpoint: BreakpointView<'_>,
    ) -> anyhow::Result<()> {
        self.push(Event::BreakpointHit(pid, tid, breakpoint.id));
        Ok(())
    }

    fn on_breakpoint_update(&self, breakpoint: BreakpointView<'_>) {
        self.push(Event::BreakpointUpdate(breakpoint.id, breakpoint.state));
    }

    fn on_breakpoint_removed(&self, id: BreakpointId) {
        self.push(Event::BreakpointRemoved(id));
    }

    fn on_module_loaded(&self, pid: ProcessId, module: &ModuleInfo) {
        self.push(Event::ModuleLoaded(pid, module.name.clone()));
    }
}

pub fn init_logs() {
    _ = env_logger::builder().is_test(true).try_init();
}

pub fn connected_session() -> (Session<RecordingHooks>, Wire, RecordingHooks) {
    init_logs();
    let wire = Wire::new();
    let hooks = RecordingHooks::default();
    let mut session = Session::new(hooks.clone());
    session
        .connect(wire.transport())
        .expect("fresh session should connect");
    (session, wire, hooks)
}

/// Feed one reply frame into the session.
pub fn reply(session: &mut Session<RecordingHooks>, txid: TransactionId, reply: &Reply) {
    session
        .on_frame(&codec::encode_reply(txid, reply))
        .expect("reply frame should apply");
}

/// Feed one notification frame into the session.
pub fn notify(session: &mut Session<RecordingHooks>, notification: &Notification) {
    session
        .on_frame(&codec::encode_notification(notification))
        .expect("notification frame should apply");
}

/// Issue a launch on the target and confirm it with an agent reply
/// carrying `pid`. Drains the wire.
pub fn launch_on(
    session: &mut Session<RecordingHooks>,
    wire: &Wire,
    target: TargetId,
    pid: u64,
) -> ProcessId {
    session
        .launch(target, "/bin/app", vec![], |_, res| {
            res.expect("launch should succeed");
        })
        .expect("launch request should go out");
    let (txid, _) = wire
        .take_requests()
        .into_iter()
        .rev()
        .find(|(_, r)| matches!(r, Request::Launch { .. }))
        .expect("launch request on the wire");
    let pid = ProcessId(pid);
    reply(
        session,
        txid,
        &Reply::ok(RequestKind::Launch, ReplyPayload::Process { pid }),
    );
    pid
}

/// Fresh target with a confirmed process on it.
pub fn start_process(
    session: &mut Session<RecordingHooks>,
    wire: &Wire,
    pid: u64,
) -> (TargetId, ProcessId) {
    let target = session.create_target();
    let pid = launch_on(session, wire, target, pid);
    (target, pid)
}
