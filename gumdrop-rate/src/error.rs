use std::{error, fmt};

/// A connection was rejected by [`crate::connection::ConnectionLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooManyConnections {
    /// The per-IP concurrent-connection cap is already at its limit.
    ConcurrentLimit,
    /// The per-IP sliding-window connection-rate cap is already at its limit.
    RateLimit,
}

impl fmt::Display for TooManyConnections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConcurrentLimit => f.write_str("too many concurrent connections from this address"),
            Self::RateLimit => f.write_str("too many connection attempts from this address"),
        }
    }
}

impl error::Error for TooManyConnections {}
