//! WebSocket protocol and handshake errors.

use std::{fmt, io};

use crate::frame::OpCode;

/// RFC 6455 frame- and message-level violations.
#[derive(Debug)]
pub enum ProtocolError {
    /// A client frame arrived unmasked.
    UnmaskedFrame,
    /// Encountered invalid opcode.
    InvalidOpcode(u8),
    /// A control frame's payload exceeded 125 bytes.
    InvalidLength(usize),
    /// One of RSV1..3 was set; no extension is negotiated.
    ReservedBitsSet,
    /// A control frame arrived with `FIN=0`.
    ControlFrameFragmented(OpCode),
    /// `CONT` arrived with no message in progress.
    ContinuationNotStarted,
    /// `TEXT`/`BINARY` arrived while a fragmented message was already in progress.
    ContinuationStarted,
    /// A completed `TEXT` message was not valid UTF-8.
    InvalidUtf8,
    /// Reassembled message size exceeded the configured cap.
    PayloadTooLarge,
    /// Attempted to send after the close handshake started.
    Closed,
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmaskedFrame => f.write_str("received an unmasked client frame"),
            Self::InvalidOpcode(byte) => write!(f, "invalid opcode {byte:#x}"),
            Self::InvalidLength(len) => write!(f, "control frame payload too long: {len} bytes"),
            Self::ReservedBitsSet => f.write_str("reserved bits set with no extension negotiated"),
            Self::ControlFrameFragmented(op) => write!(f, "control frame {op:?} arrived fragmented"),
            Self::ContinuationNotStarted => f.write_str("continuation frame with no message in progress"),
            Self::ContinuationStarted => f.write_str("new message started while a continuation was in progress"),
            Self::InvalidUtf8 => f.write_str("text message was not valid UTF-8"),
            Self::PayloadTooLarge => f.write_str("reassembled message exceeded the configured size cap"),
            Self::Closed => f.write_str("connection is closing"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// WebSocket handshake errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    GetMethodRequired,
    NoWebsocketUpgrade,
    NoConnectionUpgrade,
    NoVersionHeader,
    UnsupportedVersion,
    BadWebsocketKey,
    MalformedRequest,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::GetMethodRequired => "only GET is allowed for a websocket upgrade",
            Self::NoWebsocketUpgrade => "missing or invalid Upgrade header",
            Self::NoConnectionUpgrade => "missing or invalid Connection header",
            Self::NoVersionHeader => "missing Sec-WebSocket-Version header",
            Self::UnsupportedVersion => "unsupported Sec-WebSocket-Version",
            Self::BadWebsocketKey => "missing or invalid Sec-WebSocket-Key header",
            Self::MalformedRequest => "malformed HTTP/1.1 request line or headers",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for HandshakeError {}
