//! Re-export of [tokio::io] types and an [AsyncIo] trait built on top of them.

pub use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf, Ready};

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use std::io;

/// A wrapper trait over an [AsyncRead]/[AsyncWrite] tokio type with the extra bits gumdrop's
/// connection pipeline needs: explicit readiness waiting, a vectored-write hint, and shutdown.
///
/// Implementors expose non-blocking [io::Read]/[io::Write] that return `WouldBlock` instead of
/// parking; [`AsyncIo::ready`] is how the selector loop waits for the next readiness event.
pub trait AsyncIo: io::Read + io::Write + Unpin {
    /// Wait for `interest` to become ready.
    ///
    /// The only error this future should produce is runtime shutdown; real IO errors are
    /// surfaced through the [io::Read]/[io::Write] methods instead.
    fn ready(&self, interest: Interest) -> impl Future<Output = io::Result<Ready>> + Send + '_;

    /// Poll form of [`AsyncIo::ready`], used where a connection is driven from inside another
    /// `poll_*` method rather than an `async fn`.
    fn poll_ready(&self, interest: Interest, cx: &mut Context<'_>) -> Poll<io::Result<Ready>>;

    /// Hint whether this IO type can perform vectored writes.
    fn is_vectored_write(&self) -> bool;

    /// Shut down the write half.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}
