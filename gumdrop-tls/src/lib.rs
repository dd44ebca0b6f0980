//! Pluggable TLS/DTLS engine adaptor for gumdrop.
//!
//! Two shapes are provided, matching how the underlying transport behaves:
//!
//! - [`rustls`] and [`openssl`] expose stream-level `TlsStream<Io>` adaptors that drive a live
//!   [`gumdrop_io::io::AsyncIo`] transport directly. Use these for TCP.
//! - [`engine`] exposes a buffer-level [`engine::TlsEngine`] trait for transports with no
//!   stream semantics, namely DTLS over UDP.

pub mod delegate;
pub mod engine;
#[cfg(feature = "openssl")]
pub mod openssl;
#[cfg(any(feature = "rustls", feature = "rustls-ring-crypto"))]
pub mod rustls;
