//! HTTP/2 framing, HPACK and stream multiplexing on top of a [`gumdrop_server::Handler`].
//!
//! [`H2Connection`] owns one TCP connection's worth of HTTP/2 state for its entire lifetime:
//! it validates the connection preface, parses incoming frames, runs the HPACK codec and the
//! per-stream state machine, and drives an application-supplied [`RequestHandler`] as request
//! header blocks and data frames complete.

#![forbid(unsafe_code)]

mod connection;
mod error;
mod frame;
mod hpack;
mod stream;

pub use connection::{H2Connection, RequestHandler, Responder, PREFACE};
pub use error::{H2Error, Reason};
pub use frame::{
    Continuation, Data, Frame, GoAway, Head, Headers, Kind, Ping, Priority, PushPromise, RstStream, Settings,
    StreamDependency, StreamId, WindowUpdate, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN,
    MAX_INITIAL_WINDOW_SIZE,
};
pub use hpack::{Decoder, DecoderError, Encoder, Header};
pub use stream::{Side, State, Streams, Window};

#[cfg(test)]
mod test {
    use std::{
        io,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use gumdrop_server::{CloseReason, Handler, SendResult, Sender};

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

    #[derive(Default)]
    struct Seen {
        headers: Vec<(StreamId, Vec<Header>, bool)>,
        data: Vec<(StreamId, Vec<u8>, bool)>,
        resets: Vec<(StreamId, Reason)>,
    }

    struct RecordingService(Arc<Mutex<Seen>>);

    impl RequestHandler for RecordingService {
        fn on_headers(&mut self, stream_id: StreamId, headers: Vec<Header>, end_stream: bool, responder: &mut Responder<'_>) {
            self.0.lock().unwrap().headers.push((stream_id, headers, end_stream));
            if end_stream {
                responder.send_headers(stream_id, &[Header { name: ":status".into(), value: "200".into(), sensitive: false }], true);
            }
        }

        fn on_data(&mut self, stream_id: StreamId, data: &[u8], end_stream: bool, _responder: &mut Responder<'_>) {
            self.0.lock().unwrap().data.push((stream_id, data.to_vec(), end_stream));
        }

        fn on_reset(&mut self, stream_id: StreamId, reason: Reason) {
            self.0.lock().unwrap().resets.push((stream_id, reason));
        }
    }

    fn encode_request(headers: &[Header]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let mut block = Vec::new();
        encoder.encode(headers, &mut block);
        let mut out = Vec::new();
        Headers::encode_block(1, &block, true, DEFAULT_MAX_FRAME_SIZE, &mut out);
        out
    }

    #[test]
    fn preface_then_request_reaches_the_handler() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let mut conn = H2Connection::new(RecordingService(seen.clone()));
        let mut sender = RecordingSender { out: Vec::new(), closed: false };

        conn.on_open(&mut sender);
        assert!(!sender.out.is_empty(), "expected local SETTINGS to be sent on open");
        sender.out.clear();

        let mut wire = PREFACE.to_vec();
        wire.extend_from_slice(&encode_request(&[
            Header { name: ":method".into(), value: "GET".into(), sensitive: false },
            Header { name: ":path".into(), value: "/".into(), sensitive: false },
        ]));
        conn.on_data(&mut sender, &wire);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.headers.len(), 1);
        assert_eq!(seen.headers[0].0, 1);
        assert!(seen.headers[0].2, "end_stream should be set on a header-only request");
        assert!(!sender.out.is_empty(), "a response should have been queued back");
    }

    #[test]
    fn rejects_a_bogus_preface() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let mut conn = H2Connection::new(RecordingService(seen));
        let mut sender = RecordingSender { out: Vec::new(), closed: false };
        conn.on_data(&mut sender, b"GET / HTTP/1.1\r\n\r\n");
        assert!(sender.closed);
    }

    #[test]
    fn on_error_sends_goaway_once() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let mut conn = H2Connection::new(RecordingService(seen));
        let mut sender = RecordingSender { out: Vec::new(), closed: false };
        conn.on_error(&mut sender, &io::Error::other("reset by peer"));
        assert!(!sender.out.is_empty());
    }
}
