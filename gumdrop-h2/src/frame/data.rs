use bytes::Bytes;

use super::head::{split_padding, Head, StreamId};
use crate::error::{H2Error, Reason};

pub const END_STREAM: u8 = 0x1;
pub const PADDED: u8 = 0x8;

#[derive(Debug, Clone)]
pub struct Data {
    pub stream_id: StreamId,
    pub payload: Bytes,
    pub end_stream: bool,
    /// Total bytes this frame consumed from the flow-control window, including padding.
    pub flow_len: usize,
}

impl Data {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        let flow_len = payload.len();
        let payload = if head.flags & PADDED != 0 {
            let (data, _pad) = split_padding(payload)?;
            data
        } else {
            payload
        };
        Ok(Data {
            stream_id: head.stream_id,
            payload: Bytes::copy_from_slice(payload),
            end_stream: head.flags & END_STREAM != 0,
            flow_len,
        })
    }

    pub fn encode(&self, max_frame_size: u32, out: &mut Vec<u8>) {
        let flags = if self.end_stream { END_STREAM } else { 0 };
        let head = Head { kind: super::head::Kind::Data, length: self.payload.len() as u32, flags, stream_id: self.stream_id };
        debug_assert!(self.payload.len() as u32 <= max_frame_size);
        head.encode(super::head::kind_byte(super::head::Kind::Data), out);
        out.extend_from_slice(&self.payload);
    }
}

/// `PRIORITY`: exactly 5 bytes, reparenting information for the stream-dependency tree.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    pub stream_id: StreamId,
    pub dependency: StreamId,
    pub exclusive: bool,
    pub weight: u8,
}

impl Priority {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() != 5 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let raw = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(Priority {
            stream_id: head.stream_id,
            dependency: raw & 0x7fff_ffff,
            exclusive: raw & 0x8000_0000 != 0,
            weight: payload[4],
        })
    }
}

/// `RST_STREAM`: exactly 4 bytes, an error code abortively closing the stream.
#[derive(Debug, Clone, Copy)]
pub struct RstStream {
    pub stream_id: StreamId,
    pub error_code: crate::error::Reason,
}

impl RstStream {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() != 4 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(RstStream { stream_id: head.stream_id, error_code: Reason::from_u32(code) })
    }

    pub fn encode(self, out: &mut Vec<u8>) {
        let head = Head { kind: super::head::Kind::RstStream, length: 4, flags: 0, stream_id: self.stream_id };
        head.encode(super::head::kind_byte(super::head::Kind::RstStream), out);
        out.extend_from_slice(&self.error_code.into_u32().to_be_bytes());
    }
}

/// `WINDOW_UPDATE`: exactly 4 bytes, a non-zero flow-control credit increment.
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdate {
    pub stream_id: StreamId,
    pub increment: u32,
}

impl WindowUpdate {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() != 4 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
        if increment == 0 {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        Ok(WindowUpdate { stream_id: head.stream_id, increment })
    }

    pub fn encode(self, out: &mut Vec<u8>) {
        let head = Head { kind: super::head::Kind::WindowUpdate, length: 4, flags: 0, stream_id: self.stream_id };
        head.encode(super::head::kind_byte(super::head::Kind::WindowUpdate), out);
        out.extend_from_slice(&self.increment.to_be_bytes());
    }
}

/// `PING`: exactly 8 bytes of opaque data, echoed back verbatim unless `ACK` is set.
#[derive(Debug, Clone, Copy)]
pub struct Ping {
    pub ack: bool,
    pub payload: [u8; 8],
}

pub const ACK: u8 = 0x1;

impl Ping {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() != 8 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(payload);
        Ok(Ping { ack: head.flags & ACK != 0, payload: buf })
    }

    pub fn encode(self, out: &mut Vec<u8>) {
        let flags = if self.ack { ACK } else { 0 };
        let head = Head { kind: super::head::Kind::Ping, length: 8, flags, stream_id: 0 };
        head.encode(super::head::kind_byte(super::head::Kind::Ping), out);
        out.extend_from_slice(&self.payload);
    }
}

/// `GOAWAY`: graceful connection shutdown, naming the last stream id the sender will process.
#[derive(Debug, Clone)]
pub struct GoAway {
    pub last_stream_id: StreamId,
    pub error_code: Reason,
    pub debug_data: Bytes,
}

impl GoAway {
    pub fn parse(payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() < 8 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let last_stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(GoAway {
            last_stream_id,
            error_code: Reason::from_u32(code),
            debug_data: Bytes::copy_from_slice(&payload[8..]),
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let length = 8 + self.debug_data.len() as u32;
        let head = Head { kind: super::head::Kind::GoAway, length, flags: 0, stream_id: 0 };
        head.encode(super::head::kind_byte(super::head::Kind::GoAway), out);
        out.extend_from_slice(&self.last_stream_id.to_be_bytes());
        out.extend_from_slice(&self.error_code.into_u32().to_be_bytes());
        out.extend_from_slice(&self.debug_data);
    }
}
