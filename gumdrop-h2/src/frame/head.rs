//! The 9-octet frame header every HTTP/2 frame starts with.

use crate::error::{H2Error, Reason};

pub const HEADER_LEN: usize = 9;

pub type StreamId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(byte: u8) -> Self {
        match byte {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }

    /// RFC 7540 §6: frames scoped to a single stream must not use stream id 0.
    pub fn requires_stream(self) -> bool {
        matches!(
            self,
            Self::Data | Self::Headers | Self::Priority | Self::RstStream | Self::PushPromise | Self::Continuation
        )
    }

    /// Connection-level frames must use stream id 0.
    pub fn requires_connection(self) -> bool {
        matches!(self, Self::Settings | Self::Ping | Self::GoAway)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub kind: Kind,
    pub length: u32,
    pub flags: u8,
    pub stream_id: StreamId,
}

impl Head {
    pub fn parse(buf: &[u8]) -> Head {
        debug_assert!(buf.len() >= HEADER_LEN);
        let length = (buf[0] as u32) << 16 | (buf[1] as u32) << 8 | buf[2] as u32;
        let kind = Kind::from_u8(buf[3]);
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        Head { kind, length, flags, stream_id }
    }

    pub fn encode(self, kind_byte: u8, out: &mut Vec<u8>) {
        out.push((self.length >> 16) as u8);
        out.push((self.length >> 8) as u8);
        out.push(self.length as u8);
        out.push(kind_byte);
        out.push(self.flags);
        out.extend_from_slice(&self.stream_id.to_be_bytes());
    }

    /// Validate the stream-id/kind relationship every frame type is bound by.
    pub fn validate_stream_id(&self) -> Result<(), H2Error> {
        if self.kind.requires_stream() && self.stream_id == 0 {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        if self.kind.requires_connection() && self.stream_id != 0 {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        Ok(())
    }
}

pub(crate) fn kind_byte(kind: Kind) -> u8 {
    match kind {
        Kind::Data => 0x0,
        Kind::Headers => 0x1,
        Kind::Priority => 0x2,
        Kind::RstStream => 0x3,
        Kind::Settings => 0x4,
        Kind::PushPromise => 0x5,
        Kind::Ping => 0x6,
        Kind::GoAway => 0x7,
        Kind::WindowUpdate => 0x8,
        Kind::Continuation => 0x9,
        Kind::Unknown(b) => b,
    }
}

/// Strip padding from a padded-frame payload: `PADDED` frames carry a 1-byte pad length right
/// after any frame-specific fixed fields, followed by the real payload, followed by that many
/// pad bytes.
pub(crate) fn split_padding(payload: &[u8]) -> Result<(&[u8], usize), H2Error> {
    let pad_len = *payload.first().ok_or(H2Error::Connection(Reason::FrameSizeError))? as usize;
    let rest = &payload[1..];
    if pad_len > rest.len() {
        return Err(H2Error::Connection(Reason::ProtocolError));
    }
    Ok((&rest[..rest.len() - pad_len], pad_len))
}
