//! RFC 7540 §6.9: the signed 31-bit flow-control window, shared shape for the connection-wide
//! and per-stream windows.

use crate::error::{H2Error, Reason};
use crate::frame::MAX_INITIAL_WINDOW_SIZE;

#[derive(Debug, Clone, Copy)]
pub struct Window {
    available: i64,
}

impl Window {
    pub fn new(initial: u32) -> Self {
        Self { available: initial as i64 }
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    /// Consume `len` bytes of window after sending/receiving a DATA frame.
    pub fn consume(&mut self, len: usize) {
        self.available -= len as i64;
    }

    /// Apply a `WINDOW_UPDATE` credit. Overflowing past 2^31-1 is a connection-level
    /// `FLOW_CONTROL_ERROR` for the connection window, stream-level for a stream window; the
    /// caller decides which by how it maps the `Err` it gets back.
    pub fn apply_increment(&mut self, increment: u32) -> Result<(), H2Error> {
        let next = self.available + increment as i64;
        if next > MAX_INITIAL_WINDOW_SIZE as i64 {
            return Err(H2Error::Connection(Reason::FlowControlError));
        }
        self.available = next;
        Ok(())
    }

    /// Apply the retroactive per-stream delta from a `SETTINGS_INITIAL_WINDOW_SIZE` change.
    pub fn apply_settings_delta(&mut self, delta: i64) -> Result<(), H2Error> {
        let next = self.available + delta;
        if next > MAX_INITIAL_WINDOW_SIZE as i64 {
            return Err(H2Error::Connection(Reason::FlowControlError));
        }
        self.available = next;
        Ok(())
    }
}
