//! Worker-pool task contract for TLS engines whose handshake or rekey steps are expensive
//! enough (certificate verification, ASN.1 parsing) that the reactor thread should not run them
//! inline. Mirrors the `CHANNEL_READY` deferral pattern gumdrop-server already uses for
//! blocking work: the connection pipeline polls [`crate::engine::TlsEngine::delegated_task`]
//! and, if it returns `Some`, hands the continuation to the worker pool instead of driving the
//! engine itself on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegatedTask {
    /// The engine has buffered input and wants another handshake step run off-thread.
    Handshake,
    /// A session key update (TLS 1.3 KeyUpdate, DTLS 1.2 renegotiation) is pending.
    Rekey,
}
