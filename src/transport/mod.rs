//! Outbound message transport.
//!
//! The executor only needs to hand a [`WireMessage`] to a named queue; the
//! broker on the other side owns delivery. Sockets carry length-prefixed rkyv
//! envelopes, files and stdout carry one JSON object per line.

mod json_lines;
mod socket;

use rkyv::{Archive, Deserialize, Serialize};

use crate::codec::WireMessage;
use crate::error::{ExecutorError, Result};

pub use json_lines::JsonLinesPublisher;
pub use socket::SocketPublisher;

pub trait Publisher {
    fn publish(&mut self, queue: &str, message: &WireMessage) -> Result<()>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, queue: &str, message: &WireMessage) -> Result<()> {
        (**self).publish(queue, message)
    }
}

/// A message addressed to a queue, as written to a socket.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub struct Envelope {
    pub queue: String,
    pub message: WireMessage,
}

impl Envelope {
    /// `[u32 LE length][rkyv bytes]`
    pub fn encode_frame(&self) -> std::result::Result<Vec<u8>, rkyv::rancor::Error> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)?;
        let len = bytes.len() as u32;
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&bytes);
        Ok(frame)
    }

    /// Decode the bytes following a length prefix.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, rkyv::rancor::Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
    }

    pub fn read_length(buf: &[u8; 4]) -> usize {
        u32::from_le_bytes(*buf) as usize
    }
}

/// Pick a publisher from the transport URI.
///
/// - `unix:///path/to.sock`, `tcp://host:port`: length-prefixed envelopes
/// - `stdout`: JSON lines on standard output
/// - `file:///path/to/log.jsonl`: JSON lines appended to a file
pub fn open_publisher(uri: &str) -> Result<Box<dyn Publisher>> {
    if uri == "stdout" {
        return Ok(Box::new(JsonLinesPublisher::stdout()));
    }
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Box::new(JsonLinesPublisher::append(path)?));
    }
    if let Some(path) = uri.strip_prefix("unix://") {
        return Ok(Box::new(SocketPublisher::connect_unix(path)?));
    }
    if let Some(addr) = uri.strip_prefix("tcp://") {
        return Ok(Box::new(SocketPublisher::connect_tcp(addr)?));
    }
    Err(ExecutorError::Config(format!("unsupported transport uri: {}", uri)))
}
