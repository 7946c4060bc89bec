use crate::common::{connected_session, notify, reply, start_process, Event};
use std::cell::RefCell;
use std::rc::Rc;
use wirestalker::client::Error;
use wirestalker::protocol::{
    Notification, ModuleInfo, Reply, ReplyPayload, Request, RequestKind, ThreadId, ThreadState,
};

#[test]
fn test_thread_notifications_update_the_mirror() {
    let (mut session, wire, hooks) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);
    hooks.take();

    // a thread may be reported before it was ever listed
    let tid = ThreadId(21);
    notify(
        &mut session,
        &Notification::ThreadStateChanged {
            pid,
            tid,
            state: ThreadState::Running,
        },
    );
    let process = session.process(pid).unwrap();
    assert_eq!(process.thread_count(), 1);
    assert_eq!(process.thread(tid).unwrap().state, ThreadState::Running);

    notify(
        &mut session,
        &Notification::ThreadStateChanged {
            pid,
            tid,
            state: ThreadState::Suspended,
        },
    );
    let process = session.process(pid).unwrap();
    assert_eq!(process.thread_count(), 1);
    assert_eq!(process.thread(tid).unwrap().state, ThreadState::Suspended);

    assert_eq!(
        hooks.take(),
        vec![
            Event::ThreadState(pid, tid, ThreadState::Running),
            Event::ThreadState(pid, tid, ThreadState::Suspended),
        ]
    );
}

#[test]
fn test_dying_thread_is_pruned() {
    let (mut session, wire, hooks) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);
    let tid = ThreadId(21);
    notify(
        &mut session,
        &Notification::ThreadStateChanged {
            pid,
            tid,
            state: ThreadState::Running,
        },
    );
    hooks.take();

    notify(
        &mut session,
        &Notification::ThreadStateChanged {
            pid,
            tid,
            state: ThreadState::Dying,
        },
    );
    // the observer still sees the final transition
    assert_eq!(hooks.take(), vec![Event::ThreadState(pid, tid, ThreadState::Dying)]);
    assert!(session.process(pid).unwrap().thread(tid).is_none());
}

#[test]
fn test_list_threads_reconciles_the_mirror() {
    let (mut session, wire, _) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);
    for tid in [1, 2] {
        notify(
            &mut session,
            &Notification::ThreadStateChanged {
                pid,
                tid: ThreadId(tid),
                state: ThreadState::Running,
            },
        );
    }

    let listed = Rc::new(RefCell::new(Vec::new()));
    let l = listed.clone();
    session
        .list_threads(pid, move |_, res| {
            *l.borrow_mut() = res.unwrap();
        })
        .unwrap();
    let (txid, request) = wire.take_requests()[0].clone();
    assert_eq!(request, Request::ListThreads { pid });

    // thread 1 is gone, thread 3 is new
    reply(
        &mut session,
        txid,
        &Reply::ok(
            RequestKind::ListThreads,
            ReplyPayload::Threads {
                threads: vec![
                    (ThreadId(3), ThreadState::Running),
                    (ThreadId(2), ThreadState::Suspended),
                ],
            },
        ),
    );

    let listed = listed.borrow();
    let snapshot: Vec<(ThreadId, ThreadState)> = listed.iter().map(|t| (t.tid, t.state)).collect();
    assert_eq!(
        snapshot,
        vec![
            (ThreadId(2), ThreadState::Suspended),
            (ThreadId(3), ThreadState::Running),
        ]
    );
    let process = session.process(pid).unwrap();
    assert_eq!(process.thread_count(), 2);
    assert!(process.thread(ThreadId(1)).is_none());
}

#[test]
fn test_resume_whole_process() {
    let (mut session, wire, _) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);

    let done = Rc::new(RefCell::new(false));
    let d = done.clone();
    session
        .resume(pid, None, move |_, res| {
            res.unwrap();
            *d.borrow_mut() = true;
        })
        .unwrap();
    let (txid, request) = wire.take_requests()[0].clone();
    assert_eq!(request, Request::Resume { pid, tid: None });
    reply(&mut session, txid, &Reply::ok(RequestKind::Resume, ReplyPayload::None));
    assert!(*done.borrow());
}

#[test]
fn test_resume_unknown_thread_fails_locally() {
    let (mut session, wire, _) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);
    wire.take_requests();

    let err = session
        .resume(pid, Some(ThreadId(9)), |_, _| {})
        .unwrap_err();
    assert!(matches!(err, Error::NoSuchThread(p, t) if p == pid && t == ThreadId(9)));
    assert_eq!(wire.sent_count(), 0);
}

#[test]
fn test_pause_rejection_is_reported() {
    let (mut session, wire, _) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);

    let failure = Rc::new(RefCell::new(None));
    let f = failure.clone();
    session
        .pause(pid, None, move |_, res| {
            *f.borrow_mut() = Some(res.unwrap_err());
        })
        .unwrap();
    let (txid, _) = wire.take_requests()[0].clone();
    reply(&mut session, txid, &Reply::rejected(RequestKind::Pause, 77));
    assert!(matches!(*failure.borrow(), Some(Error::AgentRejected(77))));
}

#[test]
fn test_memory_roundtrips() {
    let (mut session, wire, _) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);

    let data = Rc::new(RefCell::new(Vec::new()));
    let d = data.clone();
    session
        .read_memory(pid, 0x4000, 4, move |_, res| {
            *d.borrow_mut() = res.unwrap();
        })
        .unwrap();
    let (txid, request) = wire.take_requests()[0].clone();
    assert_eq!(
        request,
        Request::ReadMemory {
            pid,
            address: 0x4000,
            size: 4,
        }
    );
    reply(
        &mut session,
        txid,
        &Reply::ok(
            RequestKind::ReadMemory,
            ReplyPayload::Memory {
                data: vec![0xDE, 0xAD, 0xBE, 0xEF],
            },
        ),
    );
    assert_eq!(*data.borrow(), vec![0xDE, 0xAD, 0xBE, 0xEF]);

    let done = Rc::new(RefCell::new(false));
    let d = done.clone();
    session
        .write_memory(pid, 0x4000, vec![0x90], move |_, res| {
            res.unwrap();
            *d.borrow_mut() = true;
        })
        .unwrap();
    let (txid, request) = wire.take_requests()[0].clone();
    assert_eq!(
        request,
        Request::WriteMemory {
            pid,
            address: 0x4000,
            data: vec![0x90],
        }
    );
    reply(&mut session, txid, &Reply::ok(RequestKind::WriteMemory, ReplyPayload::None));
    assert!(*done.borrow());
}

#[test]
fn test_memory_requires_tracked_process() {
    let (mut session, _wire, _) = connected_session();
    let err = session
        .read_memory(wirestalker::protocol::ProcessId(404), 0, 4, |_, _| {})
        .unwrap_err();
    assert!(matches!(err, Error::NoSuchProcess(_)));
}

#[test]
fn test_module_loaded_notification() {
    let (mut session, wire, hooks) = connected_session();
    let (_, pid) = start_process(&mut session, &wire, 7);
    hooks.take();

    notify(
        &mut session,
        &Notification::ModuleLoaded {
            pid,
            module: ModuleInfo {
                name: "libssl.so".to_string(),
                base_addr: 0x7F00_0000,
            },
        },
    );
    let modules = session.process(pid).unwrap().modules();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].name, "libssl.so");
    assert_eq!(modules[0].base_addr, 0x7F00_0000);
    assert_eq!(hooks.take(), vec![Event::ModuleLoaded(pid, "libssl.so".to_string())]);
}
