//! Message-level framing on top of [`frame::parse`]/[`frame::write`]: reassembling fragmented
//! messages, enforcing the reassembled-size cap, and encoding outgoing messages.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::{self, CloseReason, OpCode};

const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A complete WebSocket message as seen by the application.
#[derive(Debug, Eq, PartialEq)]
pub enum Message {
    Text(Bytes),
    Binary(Bytes),
    /// A caller-visible piece of a fragmented message, for callers that want to stream large
    /// payloads instead of waiting for full reassembly.
    Continuation(Item),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

#[derive(Debug, Eq, PartialEq)]
pub enum Item {
    FirstText(Bytes),
    FirstBinary(Bytes),
    Continue(Bytes),
    Last(Bytes),
}

/// WebSocket frame codec, operating in server mode: it requires masked input frames and never
/// masks what it writes.
#[derive(Debug)]
pub struct Codec {
    max_message_size: usize,
    continuation: bool,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    pub const fn new() -> Self {
        Codec { max_message_size: DEFAULT_MAX_MESSAGE_SIZE, continuation: false }
    }

    /// Cap on a single reassembled message's total size. Defaults to 16 MiB.
    pub fn set_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::Text(data) => frame::write(dst, true, OpCode::Text, &data),
            Message::Binary(data) => frame::write(dst, true, OpCode::Binary, &data),
            Message::Ping(data) => frame::write(dst, true, OpCode::Ping, &data),
            Message::Pong(data) => frame::write(dst, true, OpCode::Pong, &data),
            Message::Close(reason) => frame::write_close(dst, reason),
            Message::Continuation(item) => match item {
                Item::FirstText(data) => frame::write(dst, false, OpCode::Text, &data),
                Item::FirstBinary(data) => frame::write(dst, false, OpCode::Binary, &data),
                Item::Continue(data) => frame::write(dst, false, OpCode::Continue, &data),
                Item::Last(data) => frame::write(dst, true, OpCode::Continue, &data),
            },
        }
        Ok(())
    }

    /// Decode a single wire frame into a message. Fragmented data messages surface as
    /// [`Message::Continuation`] pieces; the connection layer reassembles them and enforces
    /// [`Self::max_message_size`] across the whole sequence.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        let frame = match frame::parse(src, self.max_message_size)? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        match frame.opcode {
            OpCode::Continue => {
                if !self.continuation {
                    return Err(ProtocolError::ContinuationNotStarted);
                }
                if frame.fin {
                    self.continuation = false;
                    Ok(Some(Message::Continuation(Item::Last(frame.payload))))
                } else {
                    Ok(Some(Message::Continuation(Item::Continue(frame.payload))))
                }
            }
            OpCode::Text if !frame.fin => {
                self.start_continuation()?;
                Ok(Some(Message::Continuation(Item::FirstText(frame.payload))))
            }
            OpCode::Binary if !frame.fin => {
                self.start_continuation()?;
                Ok(Some(Message::Continuation(Item::FirstBinary(frame.payload))))
            }
            OpCode::Text => Ok(Some(Message::Text(frame.payload))),
            OpCode::Binary => Ok(Some(Message::Binary(frame.payload))),
            OpCode::Close => Ok(Some(Message::Close(parse_close_payload(&frame.payload)))),
            OpCode::Ping => Ok(Some(Message::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Message::Pong(frame.payload))),
        }
    }

    fn start_continuation(&mut self) -> Result<(), ProtocolError> {
        if self.continuation {
            return Err(ProtocolError::ContinuationStarted);
        }
        self.continuation = true;
        Ok(())
    }
}

fn parse_close_payload(payload: &[u8]) -> Option<CloseReason> {
    if payload.len() < 2 {
        return None;
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]).into();
    let description = std::str::from_utf8(&payload[2..]).ok().filter(|s| !s.is_empty()).map(String::from);
    Some(CloseReason { code, description })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CloseCode;

    fn masked(buf: &BytesMut) -> BytesMut {
        let mut out = BytesMut::new();
        out.extend_from_slice(&[buf[0], buf[1] | 0x80]);
        let header_len = if buf[1] < 126 { 2 } else if buf[1] == 126 { 4 } else { 10 };
        out.extend_from_slice(&buf[2..header_len]);
        let mask = [1u8, 2, 3, 4];
        out.extend_from_slice(&mask);
        for (i, byte) in buf[header_len..].iter().enumerate() {
            out.extend_from_slice(&[byte ^ mask[i % 4]]);
        }
        out
    }

    #[test]
    fn decodes_a_whole_text_message() {
        let mut raw = BytesMut::new();
        frame::write(&mut raw, true, OpCode::Text, b"hi there");
        let mut wire = masked(&raw);
        let mut codec = Codec::new();
        let message = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(message, Message::Text(Bytes::from_static(b"hi there")));
    }

    #[test]
    fn reassembles_a_fragmented_text_message() {
        let mut codec = Codec::new();

        let mut first = BytesMut::new();
        frame::write(&mut first, false, OpCode::Text, b"hel");
        let mut wire = masked(&first);
        let first_msg = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(first_msg, Message::Continuation(Item::FirstText(Bytes::from_static(b"hel"))));

        let mut last = BytesMut::new();
        frame::write(&mut last, true, OpCode::Continue, b"lo");
        let mut wire = masked(&last);
        let last_msg = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(last_msg, Message::Continuation(Item::Last(Bytes::from_static(b"lo"))));
    }

    #[test]
    fn rejects_interleaved_message_start() {
        let mut codec = Codec::new();
        let mut first = BytesMut::new();
        frame::write(&mut first, false, OpCode::Text, b"hel");
        let mut wire = masked(&first);
        codec.decode(&mut wire).unwrap();

        let mut second = BytesMut::new();
        frame::write(&mut second, false, OpCode::Binary, b"oops");
        let mut wire = masked(&second);
        assert!(matches!(codec.decode(&mut wire), Err(ProtocolError::ContinuationStarted)));
    }

    #[test]
    fn decodes_a_close_frame_with_reason() {
        let mut raw = BytesMut::new();
        frame::write_close(&mut raw, Some(CloseReason { code: CloseCode::Normal, description: Some("bye".into()) }));
        let mut wire = masked(&raw);
        let mut codec = Codec::new();
        let message = codec.decode(&mut wire).unwrap().unwrap();
        match message {
            Message::Close(Some(reason)) => {
                assert_eq!(reason.code, CloseCode::Normal);
                assert_eq!(reason.description.as_deref(), Some("bye"));
            }
            other => panic!("expected a close message, got {other:?}"),
        }
    }
}
