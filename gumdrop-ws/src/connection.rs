//! The WebSocket connection state machine: HTTP/1.1 upgrade on top of raw bytes, then frame
//! codec and close handshake, behind a [`gumdrop_server::Handler`]. One [`WsConnection`] owns
//! exactly one TCP connection for its entire lifetime, mirroring how `gumdrop-h2`'s
//! `H2Connection` is self-contained rather than layered on a separate HTTP/1 crate.

use bytes::BytesMut;
use gumdrop_server::{CloseReason as TransportCloseReason, Handler, SendResult, Sender};
use tracing::{trace, warn};

use crate::codec::{Codec, Message};
use crate::error::{HandshakeError, ProtocolError};
use crate::frame::{CloseCode, CloseReason};
use crate::handshake;

/// What an application plugged into [`WsConnection`] sees of the socket.
pub trait WsHandler: Send + 'static {
    fn on_open(&mut self, _responder: &mut Responder<'_>) {}

    fn on_message(&mut self, message: WsMessage, responder: &mut Responder<'_>);

    /// The connection ended, cleanly or otherwise. `reason` is `None` when the peer's close
    /// frame carried no code (RFC 6455 reports that case to applications as 1005).
    fn on_close(&mut self, _reason: Option<CloseReason>) {}
}

/// An application-facing WebSocket message; text/binary are always fully reassembled.
#[derive(Debug)]
pub enum WsMessage {
    Text(String),
    Binary(bytes::Bytes),
}

/// The write side a [`WsHandler`] uses to send messages or start a close handshake.
pub struct Responder<'a> {
    codec: &'a mut Codec,
    sender: &'a mut dyn Sender,
    closing: &'a mut bool,
}

impl Responder<'_> {
    pub fn send_text(&mut self, text: impl Into<bytes::Bytes>) -> Result<(), ProtocolError> {
        self.send(Message::Text(text.into()))
    }

    pub fn send_binary(&mut self, data: impl Into<bytes::Bytes>) -> Result<(), ProtocolError> {
        self.send(Message::Binary(data.into()))
    }

    /// Start the close handshake. Further sends are refused once this has been called.
    pub fn close(&mut self, reason: impl Into<CloseReason>) -> Result<(), ProtocolError> {
        if *self.closing {
            return Err(ProtocolError::Closed);
        }
        *self.closing = true;
        self.send(Message::Close(Some(reason.into())))
    }

    fn send(&mut self, message: Message) -> Result<(), ProtocolError> {
        if *self.closing {
            return Err(ProtocolError::Closed);
        }
        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf)?;
        if self.sender.send(&buf) == SendResult::BackPressure {
            trace!("websocket frame queued under back pressure");
        }
        Ok(())
    }
}

enum State {
    /// Buffering the raw HTTP/1.1 upgrade request.
    Connecting,
    Open,
    /// Our close frame has gone out; waiting for the peer's.
    Closing,
    Closed,
}

struct Reassembly {
    opcode_is_text: bool,
    buf: Vec<u8>,
}

/// Drives one WebSocket connection (server role only).
pub struct WsConnection<S> {
    state: State,
    codec: Codec,
    handler: S,
    inbound: BytesMut,
    reassembly: Option<Reassembly>,
}

impl<S: WsHandler> WsConnection<S> {
    pub fn new(handler: S) -> Self {
        Self::with_codec(handler, Codec::new())
    }

    pub fn with_codec(handler: S, codec: Codec) -> Self {
        Self { state: State::Connecting, codec, handler, inbound: BytesMut::new(), reassembly: None }
    }

    fn try_complete_handshake(&mut self, sender: &mut dyn Sender) -> Result<bool, HandshakeError> {
        let Some((method, headers, consumed)) = handshake::parse_request(&self.inbound)? else {
            return Ok(false);
        };

        match handshake::verify_handshake(&method, &headers) {
            Ok(key) => {
                sender.send(&handshake::accept_response(key));
                let _ = self.inbound.split_to(consumed);
                self.state = State::Open;
                Ok(true)
            }
            Err(e) => {
                sender.send(&handshake::reject_response(e));
                sender.close();
                Err(e)
            }
        }
    }

    fn fail(&mut self, sender: &mut dyn Sender, code: CloseCode, description: &str) {
        if !matches!(self.state, State::Closed) {
            let mut buf = BytesMut::new();
            let reason = CloseReason { code, description: Some(description.to_string()) };
            crate::frame::write_close(&mut buf, Some(reason));
            sender.send(&buf);
        }
        self.state = State::Closed;
        sender.close();
    }

    fn dispatch(&mut self, message: Message, sender: &mut dyn Sender) -> Result<(), ProtocolError> {
        match message {
            Message::Ping(payload) => {
                let mut buf = BytesMut::new();
                crate::frame::write(&mut buf, true, crate::frame::OpCode::Pong, &payload);
                sender.send(&buf);
            }
            Message::Pong(_) => {}
            Message::Close(reason) => {
                let was_closing = matches!(self.state, State::Closing);
                if !was_closing {
                    let mut buf = BytesMut::new();
                    crate::frame::write_close(&mut buf, reason.clone());
                    sender.send(&buf);
                }
                self.state = State::Closed;
                self.handler.on_close(reason);
                sender.close();
            }
            Message::Text(data) => {
                let text = String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;
                let mut closing = matches!(self.state, State::Closing);
                let mut responder = Responder { codec: &mut self.codec, sender, closing: &mut closing };
                self.handler.on_message(WsMessage::Text(text), &mut responder);
                if closing {
                    self.state = State::Closing;
                }
            }
            Message::Binary(data) => {
                let mut closing = matches!(self.state, State::Closing);
                let mut responder = Responder { codec: &mut self.codec, sender, closing: &mut closing };
                self.handler.on_message(WsMessage::Binary(data), &mut responder);
                if closing {
                    self.state = State::Closing;
                }
            }
            Message::Continuation(item) => self.handle_continuation(item, sender)?,
        }
        Ok(())
    }

    fn handle_continuation(&mut self, item: crate::codec::Item, sender: &mut dyn Sender) -> Result<(), ProtocolError> {
        use crate::codec::Item;

        match item {
            Item::FirstText(chunk) => {
                self.reassembly = Some(Reassembly { opcode_is_text: true, buf: chunk.to_vec() });
            }
            Item::FirstBinary(chunk) => {
                self.reassembly = Some(Reassembly { opcode_is_text: false, buf: chunk.to_vec() });
            }
            Item::Continue(chunk) => {
                let reassembly = self.reassembly.as_mut().ok_or(ProtocolError::ContinuationNotStarted)?;
                if reassembly.buf.len() + chunk.len() > self.codec.max_message_size() {
                    return Err(ProtocolError::PayloadTooLarge);
                }
                reassembly.buf.extend_from_slice(&chunk);
            }
            Item::Last(chunk) => {
                let mut reassembly = self.reassembly.take().ok_or(ProtocolError::ContinuationNotStarted)?;
                if reassembly.buf.len() + chunk.len() > self.codec.max_message_size() {
                    return Err(ProtocolError::PayloadTooLarge);
                }
                reassembly.buf.extend_from_slice(&chunk);

                if reassembly.opcode_is_text {
                    let text = String::from_utf8(reassembly.buf).map_err(|_| ProtocolError::InvalidUtf8)?;
                    let mut closing = matches!(self.state, State::Closing);
                    let mut responder = Responder { codec: &mut self.codec, sender, closing: &mut closing };
                    self.handler.on_message(WsMessage::Text(text), &mut responder);
                    if closing {
                        self.state = State::Closing;
                    }
                } else {
                    let mut closing = matches!(self.state, State::Closing);
                    let mut responder = Responder { codec: &mut self.codec, sender, closing: &mut closing };
                    self.handler.on_message(WsMessage::Binary(reassembly.buf.into()), &mut responder);
                    if closing {
                        self.state = State::Closing;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: WsHandler> Handler for WsConnection<S> {
    fn on_open(&mut self, _sender: &mut dyn Sender) {}

    fn on_data(&mut self, sender: &mut dyn Sender, data: &[u8]) {
        self.inbound.extend_from_slice(data);

        if matches!(self.state, State::Connecting) {
            match self.try_complete_handshake(sender) {
                Ok(false) => return,
                Ok(true) => {
                    let mut closing = false;
                    let mut responder = Responder { codec: &mut self.codec, sender, closing: &mut closing };
                    self.handler.on_open(&mut responder);
                    if closing {
                        self.state = State::Closing;
                    }
                }
                Err(_) => return,
            }
        }

        if matches!(self.state, State::Closed) {
            return;
        }

        loop {
            let decoded = self.codec.decode(&mut self.inbound);
            match decoded {
                Ok(Some(message)) => {
                    if let Err(e) = self.dispatch(message, sender) {
                        let (code, description) = protocol_error_close(&e);
                        self.fail(sender, code, description);
                        return;
                    }
                    if matches!(self.state, State::Closed) {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    let (code, description) = protocol_error_close(&e);
                    self.fail(sender, code, description);
                    return;
                }
            }
        }
    }

    fn on_writable(&mut self, _sender: &mut dyn Sender) {}

    fn on_close(&mut self, reason: TransportCloseReason) {
        trace!(?reason, "websocket connection closed");
        if !matches!(self.state, State::Closed) {
            self.state = State::Closed;
            self.handler.on_close(None);
        }
    }

    fn on_error(&mut self, _sender: &mut dyn Sender, error: &std::io::Error) {
        warn!(%error, "websocket connection io error");
    }
}

fn protocol_error_close(error: &ProtocolError) -> (CloseCode, &'static str) {
    match error {
        ProtocolError::InvalidUtf8 => (CloseCode::Invalid, "invalid utf-8 in text message"),
        ProtocolError::PayloadTooLarge => (CloseCode::Size, "message exceeded the configured size cap"),
        _ => (CloseCode::Protocol, "protocol violation"),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    struct RecordingSender {
        out: Vec<u8>,
        closed: bool,
    }

    impl Sender for RecordingSender {
        fn send(&mut self, bytes: &[u8]) -> SendResult {
            self.out.extend_from_slice(bytes);
            SendResult::Ok
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:1".parse().unwrap()
        }

        fn local_addr(&self) -> SocketAddr {
            "127.0.0.1:2".parse().unwrap()
        }
    }

    struct Echo {
        received: Vec<String>,
    }

    impl WsHandler for Echo {
        fn on_message(&mut self, message: WsMessage, responder: &mut Responder<'_>) {
            if let WsMessage::Text(text) = message {
                let _ = responder.send_text(text.clone());
                self.received.push(text);
            }
        }
    }

    fn masked_frame(fin: bool, opcode: crate::frame::OpCode, payload: &[u8]) -> Vec<u8> {
        let mut raw = BytesMut::new();
        crate::frame::write(&mut raw, fin, opcode, payload);
        let header_len = if payload.len() < 126 { 2 } else if payload.len() <= u16::MAX as usize { 4 } else { 10 };
        let mask = [0xde, 0xad, 0xbe, 0xef];
        let mut out = raw[..header_len].to_vec();
        out[1] |= 0x80;
        out.extend_from_slice(&mask);
        for (i, byte) in raw[header_len..].iter().enumerate() {
            out.push(byte ^ mask[i % 4]);
        }
        out
    }

    #[test]
    fn handshake_then_echo_reaches_the_handler() {
        let mut conn = WsConnection::new(Echo { received: Vec::new() });
        let mut sender = RecordingSender { out: Vec::new(), closed: false };

        let request = b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        conn.on_open(&mut sender);
        conn.on_data(&mut sender, request);
        assert!(!sender.closed);
        assert!(sender.out.starts_with(b"HTTP/1.1 101"));
        sender.out.clear();

        let frame = masked_frame(true, crate::frame::OpCode::Text, b"hello");
        conn.on_data(&mut sender, &frame);
        assert_eq!(conn.handler.received, vec!["hello".to_string()]);
        assert!(!sender.out.is_empty());
    }

    #[test]
    fn rejects_a_bad_handshake() {
        let mut conn = WsConnection::new(Echo { received: Vec::new() });
        let mut sender = RecordingSender { out: Vec::new(), closed: false };
        let request = b"POST /chat HTTP/1.1\r\nHost: x\r\n\r\n";
        conn.on_data(&mut sender, request);
        assert!(sender.closed);
        assert!(sender.out.starts_with(b"HTTP/1.1 405"));
    }

    #[test]
    fn closes_on_invalid_utf8() {
        let mut conn = WsConnection::new(Echo { received: Vec::new() });
        let mut sender = RecordingSender { out: Vec::new(), closed: false };
        let request = b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        conn.on_data(&mut sender, request);
        sender.out.clear();

        let frame = masked_frame(true, crate::frame::OpCode::Text, &[0xff, 0xfe]);
        conn.on_data(&mut sender, &frame);
        assert!(sender.closed);
    }
}
