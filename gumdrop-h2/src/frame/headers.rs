//! `HEADERS`, `PUSH_PROMISE` and `CONTINUATION`: the three frame types that carry a HPACK header
//! block fragment. Fragment concatenation and HPACK decoding happen one layer up, in the stream
//! engine, once `end_headers` closes the block.

use bytes::Bytes;

use super::head::{split_padding, Head, Kind, StreamId};
use crate::error::{H2Error, Reason};

pub const END_STREAM: u8 = 0x1;
pub const END_HEADERS: u8 = 0x4;
pub const PADDED: u8 = 0x8;
pub const PRIORITY: u8 = 0x20;

#[derive(Debug, Clone, Copy)]
pub struct StreamDependency {
    pub dependency: StreamId,
    pub exclusive: bool,
    pub weight: u8,
}

#[derive(Debug, Clone)]
pub struct Headers {
    pub stream_id: StreamId,
    pub stream_dep: Option<StreamDependency>,
    pub header_block_fragment: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
}

impl Headers {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        let mut payload = if head.flags & PADDED != 0 {
            split_padding(payload)?.0
        } else {
            payload
        };

        let stream_dep = if head.flags & PRIORITY != 0 {
            if payload.len() < 5 {
                return Err(H2Error::Connection(Reason::FrameSizeError));
            }
            let raw = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            let dep = StreamDependency {
                dependency: raw & 0x7fff_ffff,
                exclusive: raw & 0x8000_0000 != 0,
                weight: payload[4],
            };
            payload = &payload[5..];
            Some(dep)
        } else {
            None
        };

        Ok(Headers {
            stream_id: head.stream_id,
            stream_dep,
            header_block_fragment: Bytes::copy_from_slice(payload),
            end_stream: head.flags & END_STREAM != 0,
            end_headers: head.flags & END_HEADERS != 0,
        })
    }

    /// Split an encoded header block into `HEADERS` followed by zero or more `CONTINUATION`
    /// frames, each respecting the peer's `max_frame_size`.
    pub fn encode_block(stream_id: StreamId, block: &[u8], end_stream: bool, max_frame_size: u32, out: &mut Vec<u8>) {
        let max = max_frame_size as usize;
        let mut chunks = block.chunks(max.max(1));
        let first = chunks.next().unwrap_or(&[]);

        let mut flags = if end_stream { END_STREAM } else { 0 };
        let more = block.len() > first.len();
        if !more {
            flags |= END_HEADERS;
        }

        let head = Head { kind: Kind::Headers, length: first.len() as u32, flags, stream_id };
        head.encode(super::head::kind_byte(Kind::Headers), out);
        out.extend_from_slice(first);

        let remaining: Vec<&[u8]> = chunks.collect();
        for (i, chunk) in remaining.iter().enumerate() {
            let is_last = i + 1 == remaining.len();
            let flags = if is_last { END_HEADERS } else { 0 };
            let head = Head { kind: Kind::Continuation, length: chunk.len() as u32, flags, stream_id };
            head.encode(super::head::kind_byte(Kind::Continuation), out);
            out.extend_from_slice(chunk);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushPromise {
    pub stream_id: StreamId,
    pub promised_stream_id: StreamId,
    pub header_block_fragment: Bytes,
    pub end_headers: bool,
}

impl PushPromise {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        let payload = if head.flags & PADDED != 0 {
            split_padding(payload)?.0
        } else {
            payload
        };
        if payload.len() < 4 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let promised_stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
        Ok(PushPromise {
            stream_id: head.stream_id,
            promised_stream_id,
            header_block_fragment: Bytes::copy_from_slice(&payload[4..]),
            end_headers: head.flags & END_HEADERS != 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Continuation {
    pub stream_id: StreamId,
    pub header_block_fragment: Bytes,
    pub end_headers: bool,
}

impl Continuation {
    pub fn parse(head: Head, payload: &[u8]) -> Self {
        Continuation {
            stream_id: head.stream_id,
            header_block_fragment: Bytes::copy_from_slice(payload),
            end_headers: head.flags & END_HEADERS != 0,
        }
    }
}
