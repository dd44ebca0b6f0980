//! `SETTINGS`: a sequence of 6-byte (id, value) pairs negotiating connection-wide parameters.

use super::head::Head;
use crate::error::{H2Error, Reason};

pub const ACK: u8 = 0x1;

pub const HEADER_TABLE_SIZE: u16 = 0x1;
pub const ENABLE_PUSH: u16 = 0x2;
pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const MAX_FRAME_SIZE: u16 = 0x5;
pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;

pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const MAX_INITIAL_WINDOW_SIZE: u32 = (1 << 31) - 1;

/// One `SETTINGS` frame's parameters, already validated per RFC 7540 §6.5.2. Unrecognised
/// parameter ids are accepted and ignored, per spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub ack: bool,
    pub header_table_size: Option<u32>,
    pub enable_push: Option<bool>,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    pub fn parse(head: Head, payload: &[u8]) -> Result<Self, H2Error> {
        if head.flags & ACK != 0 {
            if !payload.is_empty() {
                return Err(H2Error::Connection(Reason::FrameSizeError));
            }
            return Ok(Settings { ack: true, ..Default::default() });
        }

        if payload.len() % 6 != 0 {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }

        let mut settings = Settings::default();
        for chunk in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);

            match id {
                HEADER_TABLE_SIZE => settings.header_table_size = Some(value),
                ENABLE_PUSH => {
                    if value > 1 {
                        return Err(H2Error::Connection(Reason::ProtocolError));
                    }
                    settings.enable_push = Some(value == 1);
                }
                MAX_CONCURRENT_STREAMS => settings.max_concurrent_streams = Some(value),
                INITIAL_WINDOW_SIZE => {
                    if value > MAX_INITIAL_WINDOW_SIZE {
                        return Err(H2Error::Connection(Reason::FlowControlError));
                    }
                    settings.initial_window_size = Some(value);
                }
                MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                        return Err(H2Error::Connection(Reason::ProtocolError));
                    }
                    settings.max_frame_size = Some(value);
                }
                MAX_HEADER_LIST_SIZE => settings.max_header_list_size = Some(value),
                _ => {}
            }
        }

        Ok(settings)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        if self.ack {
            let head = Head { kind: super::head::Kind::Settings, length: 0, flags: ACK, stream_id: 0 };
            head.encode(super::head::kind_byte(super::head::Kind::Settings), out);
            return;
        }

        let mut payload = Vec::new();
        let mut push = |id: u16, value: Option<u32>| {
            if let Some(value) = value {
                payload.extend_from_slice(&id.to_be_bytes());
                payload.extend_from_slice(&value.to_be_bytes());
            }
        };
        push(HEADER_TABLE_SIZE, self.header_table_size);
        push(ENABLE_PUSH, self.enable_push.map(|b| b as u32));
        push(MAX_CONCURRENT_STREAMS, self.max_concurrent_streams);
        push(INITIAL_WINDOW_SIZE, self.initial_window_size);
        push(MAX_FRAME_SIZE, self.max_frame_size);
        push(MAX_HEADER_LIST_SIZE, self.max_header_list_size);

        let head = Head { kind: super::head::Kind::Settings, length: payload.len() as u32, flags: 0, stream_id: 0 };
        head.encode(super::head::kind_byte(super::head::Kind::Settings), out);
        out.extend_from_slice(&payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_initial_window_size() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&INITIAL_WINDOW_SIZE.to_be_bytes());
        payload.extend_from_slice(&(MAX_INITIAL_WINDOW_SIZE + 1).to_be_bytes());
        let head = Head { kind: super::super::head::Kind::Settings, length: payload.len() as u32, flags: 0, stream_id: 0 };
        assert_eq!(Settings::parse(head, &payload), Err(H2Error::Connection(Reason::FlowControlError)));
    }

    #[test]
    fn ack_frame_must_be_empty() {
        let head = Head { kind: super::super::head::Kind::Settings, length: 1, flags: ACK, stream_id: 0 };
        assert_eq!(Settings::parse(head, &[0u8]), Err(H2Error::Connection(Reason::FrameSizeError)));
    }
}
