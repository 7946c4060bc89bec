//! Binary encoding of protocol frames.
//!
//! All integers are little-endian. Strings and byte arrays are prefixed
//! with their `u32` length. A frame is the 16-byte header followed by the
//! payload; replies are distinguished from requests by a high bit in the
//! kind field, notifications use a dedicated kind range and transaction
//! id 0.

use crate::protocol::{
    BreakpointId, Message, ModuleInfo, Notification, ProcessId, Reply, ReplyPayload, Request,
    RequestKind, ThreadId, ThreadState, TransactionId, STATUS_OK,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header: transaction id (u64) + kind (u32) + payload length (u32).
pub const HEADER_LEN: usize = 16;

const REPLY_FLAG: u32 = 1 << 31;

const NOTIFY_PROCESS_EXITED: u32 = 100;
const NOTIFY_THREAD_STATE: u32 = 101;
const NOTIFY_MODULE_LOADED: u32 = 102;
const NOTIFY_BREAKPOINT_HIT: u32 = 103;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame shorter than the {HEADER_LEN}-byte header")]
    NoHeader,
    #[error("payload length mismatch: header says {expected}, frame carries {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("unknown thread state {0}")]
    UnknownThreadState(u8),
    #[error("request frame with reserved transaction id 0")]
    MissingTransaction,
    #[error("notification frame with nonzero transaction id {0}")]
    UnexpectedTransaction(u64),
    #[error("payload truncated")]
    Truncated,
    #[error("invalid utf-8 in string field")]
    Utf8,
}

/// Extract the payload length from a raw header. Used by transports for
/// framing, before the frame body is even available.
pub fn payload_len(header: &[u8]) -> Result<usize, DecodeError> {
    if header.len() < HEADER_LEN {
        return Err(DecodeError::NoHeader);
    }
    let mut tail = &header[12..HEADER_LEN];
    Ok(tail.get_u32_le() as usize)
}

pub fn encode_request(txid: TransactionId, request: &Request) -> Bytes {
    let mut payload = BytesMut::new();
    match request {
        Request::Launch { program, args } => {
            put_str(&mut payload, program);
            payload.put_u32_le(args.len() as u32);
            for arg in args {
                put_str(&mut payload, arg);
            }
        }
        Request::Attach { pid }
        | Request::Detach { pid }
        | Request::Kill { pid }
        | Request::ListThreads { pid } => payload.put_u64_le(pid.0),
        Request::Resume { pid, tid } | Request::Pause { pid, tid } => {
            payload.put_u64_le(pid.0);
            payload.put_u64_le(tid.map(|t| t.0).unwrap_or(0));
        }
        Request::AddBreakpoint { id, pid, address } => {
            payload.put_u32_le(id.0);
            payload.put_u64_le(pid.0);
            payload.put_u64_le(*address);
        }
        Request::RemoveBreakpoint { id, pid } => {
            payload.put_u32_le(id.0);
            payload.put_u64_le(pid.0);
        }
        Request::ReadMemory { pid, address, size } => {
            payload.put_u64_le(pid.0);
            payload.put_u64_le(*address);
            payload.put_u32_le(*size);
        }
        Request::WriteMemory { pid, address, data } => {
            payload.put_u64_le(pid.0);
            payload.put_u64_le(*address);
            payload.put_u32_le(data.len() as u32);
            payload.put_slice(data);
        }
    }
    frame(txid.0, request.kind() as u32, payload)
}

pub fn encode_reply(txid: TransactionId, reply: &Reply) -> Bytes {
    let mut payload = BytesMut::new();
    payload.put_u32_le(reply.status);
    if reply.status == STATUS_OK {
        match &reply.payload {
            ReplyPayload::None => {}
            ReplyPayload::Process { pid } => payload.put_u64_le(pid.0),
            ReplyPayload::Memory { data } => {
                payload.put_u32_le(data.len() as u32);
                payload.put_slice(data);
            }
            ReplyPayload::Threads { threads } => {
                payload.put_u32_le(threads.len() as u32);
                for (tid, state) in threads {
                    payload.put_u64_le(tid.0);
                    payload.put_u8(thread_state_to_wire(*state));
                }
            }
        }
    }
    frame(txid.0, reply.kind as u32 | REPLY_FLAG, payload)
}

pub fn encode_notification(notification: &Notification) -> Bytes {
    let mut payload = BytesMut::new();
    let kind = match notification {
        Notification::ProcessExited { pid, exit_code } => {
            payload.put_u64_le(pid.0);
            payload.put_i32_le(*exit_code);
            NOTIFY_PROCESS_EXITED
        }
        Notification::ThreadStateChanged { pid, tid, state } => {
            payload.put_u64_le(pid.0);
            payload.put_u64_le(tid.0);
            payload.put_u8(thread_state_to_wire(*state));
            NOTIFY_THREAD_STATE
        }
        Notification::ModuleLoaded { pid, module } => {
            payload.put_u64_le(pid.0);
            put_str(&mut payload, &module.name);
            payload.put_u64_le(module.base_addr);
            NOTIFY_MODULE_LOADED
        }
        Notification::BreakpointHit {
            pid,
            tid,
            breakpoint,
        } => {
            payload.put_u64_le(pid.0);
            payload.put_u64_le(tid.0);
            payload.put_u32_le(breakpoint.0);
            NOTIFY_BREAKPOINT_HIT
        }
    };
    frame(0, kind, payload)
}

/// Decode one complete frame.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::NoHeader);
    }
    let mut header = &frame[..HEADER_LEN];
    let txid = header.get_u64_le();
    let kind = header.get_u32_le();
    let expected = header.get_u32_le() as usize;
    let payload = &frame[HEADER_LEN..];
    if payload.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut buf = payload;
    if kind & REPLY_FLAG != 0 {
        let reply = decode_reply(kind & !REPLY_FLAG, &mut buf)?;
        Ok(Message::Reply(TransactionId(txid), reply))
    } else if kind >= NOTIFY_PROCESS_EXITED {
        if txid != 0 {
            return Err(DecodeError::UnexpectedTransaction(txid));
        }
        Ok(Message::Notification(decode_notification(kind, &mut buf)?))
    } else {
        if txid == 0 {
            return Err(DecodeError::MissingTransaction);
        }
        let request = decode_request(kind, &mut buf)?;
        Ok(Message::Request(TransactionId(txid), request))
    }
}

fn decode_request(kind: u32, buf: &mut &[u8]) -> Result<Request, DecodeError> {
    let kind = RequestKind::from_repr(kind).ok_or(DecodeError::UnknownKind(kind))?;
    let request = match kind {
        RequestKind::Launch => {
            let program = get_str(buf)?;
            let argc = get_u32(buf)?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(get_str(buf)?);
            }
            Request::Launch { program, args }
        }
        RequestKind::Attach => Request::Attach {
            pid: ProcessId(get_u64(buf)?),
        },
        RequestKind::Detach => Request::Detach {
            pid: ProcessId(get_u64(buf)?),
        },
        RequestKind::Kill => Request::Kill {
            pid: ProcessId(get_u64(buf)?),
        },
        RequestKind::Resume => {
            let pid = ProcessId(get_u64(buf)?);
            let tid = get_u64(buf)?;
            Request::Resume {
                pid,
                tid: (tid != 0).then_some(ThreadId(tid)),
            }
        }
        RequestKind::Pause => {
            let pid = ProcessId(get_u64(buf)?);
            let tid = get_u64(buf)?;
            Request::Pause {
                pid,
                tid: (tid != 0).then_some(ThreadId(tid)),
            }
        }
        RequestKind::AddBreakpoint => Request::AddBreakpoint {
            id: BreakpointId(get_u32(buf)?),
            pid: ProcessId(get_u64(buf)?),
            address: get_u64(buf)?,
        },
        RequestKind::RemoveBreakpoint => Request::RemoveBreakpoint {
            id: BreakpointId(get_u32(buf)?),
            pid: ProcessId(get_u64(buf)?),
        },
        RequestKind::ReadMemory => Request::ReadMemory {
            pid: ProcessId(get_u64(buf)?),
            address: get_u64(buf)?,
            size: get_u32(buf)?,
        },
        RequestKind::WriteMemory => {
            let pid = ProcessId(get_u64(buf)?);
            let address = get_u64(buf)?;
            let len = get_u32(buf)? as usize;
            Request::WriteMemory {
                pid,
                address,
                data: get_bytes(buf, len)?,
            }
        }
        RequestKind::ListThreads => Request::ListThreads {
            pid: ProcessId(get_u64(buf)?),
        },
    };
    Ok(request)
}

fn decode_reply(kind: u32, buf: &mut &[u8]) -> Result<Reply, DecodeError> {
    let kind = RequestKind::from_repr(kind).ok_or(DecodeError::UnknownKind(kind))?;
    let status = get_u32(buf)?;
    if status != STATUS_OK {
        return Ok(Reply::rejected(kind, status));
    }

    let payload = match kind {
        RequestKind::Launch | RequestKind::Attach => ReplyPayload::Process {
            pid: ProcessId(get_u64(buf)?),
        },
        RequestKind::ReadMemory => {
            let len = get_u32(buf)? as usize;
            ReplyPayload::Memory {
                data: get_bytes(buf, len)?,
            }
        }
        RequestKind::ListThreads => {
            let count = get_u32(buf)?;
            let mut threads = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let tid = ThreadId(get_u64(buf)?);
                let state = thread_state_from_wire(get_u8(buf)?)?;
                threads.push((tid, state));
            }
            ReplyPayload::Threads { threads }
        }
        _ => ReplyPayload::None,
    };
    Ok(Reply::ok(kind, payload))
}

fn decode_notification(kind: u32, buf: &mut &[u8]) -> Result<Notification, DecodeError> {
    let notification = match kind {
        NOTIFY_PROCESS_EXITED => Notification::ProcessExited {
            pid: ProcessId(get_u64(buf)?),
            exit_code: get_i32(buf)?,
        },
        NOTIFY_THREAD_STATE => Notification::ThreadStateChanged {
            pid: ProcessId(get_u64(buf)?),
            tid: ThreadId(get_u64(buf)?),
            state: thread_state_from_wire(get_u8(buf)?)?,
        },
        NOTIFY_MODULE_LOADED => {
            let pid = ProcessId(get_u64(buf)?);
            let name = get_str(buf)?;
            let base_addr = get_u64(buf)?;
            Notification::ModuleLoaded {
                pid,
                module: ModuleInfo { name, base_addr },
            }
        }
        NOTIFY_BREAKPOINT_HIT => Notification::BreakpointHit {
            pid: ProcessId(get_u64(buf)?),
            tid: ThreadId(get_u64(buf)?),
            breakpoint: BreakpointId(get_u32(buf)?),
        },
        _ => return Err(DecodeError::UnknownKind(kind)),
    };
    Ok(notification)
}

fn frame(txid: u64, kind: u32, payload: BytesMut) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u64_le(txid);
    frame.put_u32_le(kind);
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(&payload);
    frame.freeze()
}

fn thread_state_to_wire(state: ThreadState) -> u8 {
    match state {
        ThreadState::Running => 0,
        ThreadState::Suspended => 1,
        ThreadState::Blocked => 2,
        ThreadState::Dying => 3,
    }
}

fn thread_state_from_wire(raw: u8) -> Result<ThreadState, DecodeError> {
    let state = match raw {
        0 => ThreadState::Running,
        1 => ThreadState::Suspended,
        2 => ThreadState::Blocked,
        3 => ThreadState::Dying,
        _ => return Err(DecodeError::UnknownThreadState(raw)),
    };
    Ok(state)
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_str(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let len = get_u32(buf)? as usize;
    let bytes = get_bytes(buf, len)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    if buf.remaining() < 1 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_u32_le())
}

fn get_i32(buf: &mut &[u8]) -> Result<i32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_i32_le())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    if buf.remaining() < 8 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_u64_le())
}

fn get_bytes(buf: &mut &[u8], len: usize) -> Result<Vec<u8>, DecodeError> {
    if buf.remaining() < len {
        return Err(DecodeError::Truncated);
    }
    let mut data = vec![0; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}
