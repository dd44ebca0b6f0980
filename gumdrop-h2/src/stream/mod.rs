//! RFC 7540 §5: per-stream state, id allocation, and the header-block atomicity and flow-control
//! bookkeeping the connection layer enforces while pumping frames.

mod flow;

use std::collections::HashMap;

pub use flow::Window;

use crate::error::{H2Error, Reason};
use crate::frame::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,
    pub state: State,
    pub send_window: Window,
    pub recv_window: Window,
    pub weight: u8,
    pub parent: StreamId,
}

impl Stream {
    fn new(id: StreamId, initial_send: u32, initial_recv: u32) -> Self {
        Self {
            id,
            state: State::Idle,
            send_window: Window::new(initial_send),
            recv_window: Window::new(initial_recv),
            weight: 16,
            parent: 0,
        }
    }

    /// Any frame other than WINDOW_UPDATE/PRIORITY/RST_STREAM is a protocol error once the peer
    /// has half-closed their side.
    pub fn accepts_from_peer(&self, kind: crate::frame::Kind) -> bool {
        use crate::frame::Kind;
        match self.state {
            State::HalfClosedRemote | State::Closed => {
                matches!(kind, Kind::WindowUpdate | Kind::Priority | Kind::RstStream)
            }
            _ => true,
        }
    }
}

/// Which side of a stream's half of the exchange a HEADERS frame came from, needed to compute
/// the correct `HALF_CLOSED_*` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

pub struct Streams {
    streams: HashMap<StreamId, Stream>,
    last_peer_initiated: StreamId,
    last_local_initiated: StreamId,
    last_pushed: StreamId,
    /// Set while a HEADERS/PUSH_PROMISE without END_HEADERS is in flight: only CONTINUATION
    /// frames for this stream may follow until END_HEADERS closes the block.
    open_header_block: Option<StreamId>,
    initial_send_window: u32,
    initial_recv_window: u32,
    goaway_sent: Option<StreamId>,
    goaway_received: Option<StreamId>,
}

impl Streams {
    pub fn new(initial_window: u32) -> Self {
        Self {
            streams: HashMap::new(),
            last_peer_initiated: 0,
            last_local_initiated: 0,
            last_pushed: 0,
            open_header_block: None,
            initial_send_window: initial_window,
            initial_recv_window: initial_window,
            goaway_sent: None,
            goaway_received: None,
        }
    }

    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn remove(&mut self, id: StreamId) {
        self.streams.remove(&id);
    }

    /// Open a stream the peer initiated via HEADERS. Peer-opened ids strictly increase.
    pub fn open_peer_initiated(&mut self, id: StreamId) -> Result<&mut Stream, H2Error> {
        if id <= self.last_peer_initiated {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        if let Some(last) = self.goaway_sent {
            if id > last {
                return Err(H2Error::Connection(Reason::ProtocolError));
            }
        }
        self.last_peer_initiated = id;
        let stream = Stream::new(id, self.initial_send_window, self.initial_recv_window);
        Ok(self.streams.entry(id).or_insert(stream))
    }

    /// Open a stream this side initiates (client request streams; always odd ids here since
    /// gumdrop-h2 only plays the server role).
    pub fn open_local_initiated(&mut self, id: StreamId) -> &mut Stream {
        self.last_local_initiated = id;
        self.streams.entry(id).or_insert_with(|| Stream::new(id, self.initial_send_window, self.initial_recv_window))
    }

    /// Reserve a server-push stream id: even, strictly greater than the last one pushed.
    pub fn reserve_push(&mut self, id: StreamId) -> Result<&mut Stream, H2Error> {
        if id % 2 != 0 || id <= self.last_pushed {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        self.last_pushed = id;
        let mut stream = Stream::new(id, self.initial_send_window, self.initial_recv_window);
        stream.state = State::ReservedLocal;
        Ok(self.streams.entry(id).or_insert(stream))
    }

    pub fn begin_header_block(&mut self, id: StreamId, end_headers: bool) -> Result<(), H2Error> {
        if let Some(open) = self.open_header_block {
            if open != id {
                return Err(H2Error::Connection(Reason::ProtocolError));
            }
        }
        if !end_headers {
            self.open_header_block = Some(id);
        }
        Ok(())
    }

    /// Validate a CONTINUATION belongs to the currently open header block.
    pub fn continue_header_block(&mut self, id: StreamId, end_headers: bool) -> Result<(), H2Error> {
        match self.open_header_block {
            Some(open) if open == id => {
                if end_headers {
                    self.open_header_block = None;
                }
                Ok(())
            }
            _ => Err(H2Error::Connection(Reason::ProtocolError)),
        }
    }

    pub fn header_block_open(&self) -> bool {
        self.open_header_block.is_some()
    }

    pub fn apply_end_stream(&mut self, id: StreamId, side: Side) -> Result<(), H2Error> {
        let stream = self.streams.get_mut(&id).ok_or(H2Error::Connection(Reason::ProtocolError))?;
        stream.state = match (stream.state, side) {
            (State::Idle | State::ReservedRemote, Side::Remote) => State::HalfClosedRemote,
            (State::Idle | State::ReservedLocal, Side::Local) => State::HalfClosedLocal,
            (State::Open, Side::Remote) => State::HalfClosedRemote,
            (State::Open, Side::Local) => State::HalfClosedLocal,
            (State::HalfClosedLocal, Side::Remote) => State::Closed,
            (State::HalfClosedRemote, Side::Local) => State::Closed,
            (other, _) => other,
        };
        Ok(())
    }

    pub fn open_without_end_stream(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(&id) {
            if stream.state == State::Idle {
                stream.state = State::Open;
            }
        }
    }

    pub fn reset(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.state = State::Closed;
        }
    }

    /// Retroactively resize every open stream's send window by `delta` after a local
    /// `SETTINGS_INITIAL_WINDOW_SIZE` change from the peer.
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> Result<(), H2Error> {
        for stream in self.streams.values_mut() {
            stream.send_window.apply_settings_delta(delta)?;
        }
        Ok(())
    }

    pub fn set_initial_window(&mut self, window: u32) {
        self.initial_send_window = window;
    }

    pub fn record_goaway_sent(&mut self, last_stream_id: StreamId) -> bool {
        match self.goaway_sent {
            Some(prev) if last_stream_id >= prev => false,
            _ => {
                self.goaway_sent = Some(last_stream_id);
                true
            }
        }
    }

    pub fn record_goaway_received(&mut self, last_stream_id: StreamId) {
        self.goaway_received = Some(last_stream_id);
    }

    pub fn goaway_received(&self) -> Option<StreamId> {
        self.goaway_received
    }

    pub fn next_client_stream_would_be_accepted(&self, id: StreamId) -> bool {
        id > self.last_peer_initiated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_increasing_peer_stream_ids() {
        let mut streams = Streams::new(65_535);
        streams.open_peer_initiated(3).unwrap();
        assert!(streams.open_peer_initiated(3).is_err());
        assert!(streams.open_peer_initiated(1).is_err());
        assert!(streams.open_peer_initiated(5).is_ok());
    }

    #[test]
    fn header_block_atomicity_rejects_interleaved_stream() {
        let mut streams = Streams::new(65_535);
        streams.begin_header_block(1, false).unwrap();
        assert!(streams.continue_header_block(3, true).is_err());
        streams.continue_header_block(1, true).unwrap();
        assert!(!streams.header_block_open());
    }

    #[test]
    fn half_closed_remote_transition() {
        let mut streams = Streams::new(65_535);
        let stream = streams.open_peer_initiated(1).unwrap();
        stream.state = State::Open;
        streams.apply_end_stream(1, Side::Remote).unwrap();
        assert_eq!(streams.get(1).unwrap().state, State::HalfClosedRemote);
    }

    #[test]
    fn flow_control_window_rejects_overflow() {
        let mut window = Window::new(DEFAULT_TEST_WINDOW);
        assert!(window.apply_increment(u32::MAX).is_err());
    }

    const DEFAULT_TEST_WINDOW: u32 = 65_535;
}
