//! WebSocket handshake, frame codec and connection state machine on top of a
//! [`gumdrop_server::Handler`].
//!
//! [`WsConnection`] owns one TCP connection for its entire lifetime: it parses and validates
//! the HTTP/1.1 upgrade request directly off the wire, then runs the RFC 6455 frame codec,
//! message reassembly and close handshake, driving an application-supplied [`WsHandler`] as
//! complete text/binary messages arrive.

#![forbid(unsafe_code)]

mod codec;
mod connection;
mod error;
mod frame;
mod handshake;

pub use codec::{Codec, Item, Message};
pub use connection::{Responder, WsConnection, WsHandler, WsMessage};
pub use error::{HandshakeError, ProtocolError};
pub use frame::{CloseCode, CloseReason, OpCode};
pub use handshake::hash_key;
