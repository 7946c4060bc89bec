//! Framed transport to a debug agent.
//!
//! A transport moves whole frames; header parsing and dispatch stay in
//! [`Session`](crate::client::Session). The session owns the transport
//! exclusively: it is the single writer and the single reader.

use crate::protocol::codec::{self, HEADER_LEN};
use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

pub trait Transport {
    /// Send one outbound frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Block until one inbound frame is available.
    fn recv(&mut self) -> io::Result<Vec<u8>>;
}

/// TCP transport. The wire header itself is the framing: a frame is read
/// as a fixed header plus `payload length` more bytes.
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut frame = vec![0u8; HEADER_LEN];
        self.reader.read_exact(&mut frame)?;
        let payload_len = codec::payload_len(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        frame.resize(HEADER_LEN + payload_len, 0);
        self.reader.read_exact(&mut frame[HEADER_LEN..])?;
        Ok(frame)
    }
}
