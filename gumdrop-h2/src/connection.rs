//! Ties frame parsing, HPACK and the stream engine together behind a [`gumdrop_server::Handler`]:
//! one [`H2Connection`] owns exactly one TCP connection's worth of HTTP/2 multiplexing for its
//! entire lifetime, running on whichever worker thread accepted it.

use bytes::{Bytes, BytesMut};
use gumdrop_server::{CloseReason, Handler, SendResult, Sender};
use tracing::{debug, trace, warn};

use crate::error::{H2Error, Reason};
use crate::frame::{self, Frame, Kind, StreamId};

fn frame_kind(frame: &Frame) -> Option<Kind> {
    match frame {
        Frame::Data(_) => Some(Kind::Data),
        Frame::Headers(_) => Some(Kind::Headers),
        Frame::Priority(_) => Some(Kind::Priority),
        Frame::RstStream(_) => Some(Kind::RstStream),
        Frame::PushPromise(_) => Some(Kind::PushPromise),
        Frame::WindowUpdate(_) => Some(Kind::WindowUpdate),
        Frame::Continuation(_) => Some(Kind::Continuation),
        Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => None,
    }
}
use crate::hpack::{self, Header};
use crate::stream::{self, Side, State, Streams};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// What an application plugged into [`H2Connection`] sees of every multiplexed stream.
pub trait RequestHandler: Send + 'static {
    /// A request's header block finished decoding. `end_stream` means there is no body.
    fn on_headers(&mut self, stream_id: StreamId, headers: Vec<Header>, end_stream: bool, responder: &mut Responder<'_>);

    fn on_data(&mut self, stream_id: StreamId, data: &[u8], end_stream: bool, responder: &mut Responder<'_>);

    fn on_reset(&mut self, stream_id: StreamId, reason: Reason);
}

/// The write side an application uses from within a [`RequestHandler`] callback to answer a
/// specific stream; frames it queues are HPACK-encoded and flow-control-checked immediately.
pub struct Responder<'a> {
    conn: &'a mut Inner,
    sender: &'a mut dyn Sender,
}

impl Responder<'_> {
    pub fn send_headers(&mut self, stream_id: StreamId, headers: &[Header], end_stream: bool) {
        self.conn.send_headers(self.sender, stream_id, headers, end_stream);
    }

    pub fn send_data(&mut self, stream_id: StreamId, data: &[u8], end_stream: bool) {
        self.conn.send_data(self.sender, stream_id, data, end_stream);
    }

    pub fn reset_stream(&mut self, stream_id: StreamId, reason: Reason) {
        self.conn.reset_stream(self.sender, stream_id, reason);
    }
}

struct Inner {
    streams: Streams,
    encoder: hpack::Encoder,
    decoder: hpack::Decoder,
    connection_send_window: stream::Window,
    connection_recv_window: stream::Window,
    peer_max_frame_size: u32,
    local_settings_acked: bool,
    preface_seen: bool,
    goaway_sent: bool,
    in_progress_headers: Option<PartialBlock>,
}

struct PartialBlock {
    stream_id: StreamId,
    fragment: BytesMut,
    end_stream: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            streams: Streams::new(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(4096),
            connection_send_window: stream::Window::new(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            connection_recv_window: stream::Window::new(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            peer_max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            local_settings_acked: false,
            preface_seen: false,
            goaway_sent: false,
            in_progress_headers: None,
        }
    }

    fn send_headers(&mut self, sender: &mut dyn Sender, stream_id: StreamId, headers: &[Header], end_stream: bool) {
        let mut block = Vec::new();
        self.encoder.encode(headers, &mut block);
        let mut out = Vec::new();
        frame::Headers::encode_block(stream_id, &block, end_stream, self.peer_max_frame_size, &mut out);
        if sender.send(&out) == SendResult::BackPressure {
            trace!(stream_id, "headers queued under back pressure");
        }
        if end_stream {
            let _ = self.streams.apply_end_stream(stream_id, Side::Local);
        } else {
            self.streams.open_without_end_stream(stream_id);
        }
    }

    fn send_data(&mut self, sender: &mut dyn Sender, stream_id: StreamId, data: &[u8], end_stream: bool) {
        let Some(stream) = self.streams.get_mut(stream_id) else {
            return;
        };
        let window = stream.send_window.available().min(self.connection_send_window.available());
        let window = window.max(0) as usize;
        let to_send = data.len().min(window);

        let slice = &data[..to_send];
        let max_frame_size = self.peer_max_frame_size.max(1) as usize;
        let num_chunks = slice.len().div_ceil(max_frame_size).max(1);

        for (i, chunk) in slice.chunks(max_frame_size).enumerate() {
            let is_final_chunk = i + 1 == num_chunks;
            let data_frame = frame::Data {
                stream_id,
                payload: Bytes::copy_from_slice(chunk),
                end_stream: end_stream && is_final_chunk,
                flow_len: chunk.len(),
            };
            let mut out = Vec::new();
            data_frame.encode(self.peer_max_frame_size, &mut out);
            sender.send(&out);
            self.connection_send_window.consume(chunk.len());
            if let Some(stream) = self.streams.get_mut(stream_id) {
                stream.send_window.consume(chunk.len());
            }
        }

        if to_send < data.len() {
            debug!(stream_id, queued = data.len() - to_send, "data exceeds flow control window, dropping tail");
        }

        if end_stream {
            let _ = self.streams.apply_end_stream(stream_id, Side::Local);
        }
    }

    fn reset_stream(&mut self, sender: &mut dyn Sender, stream_id: StreamId, reason: Reason) {
        self.streams.reset(stream_id);
        let mut out = Vec::new();
        frame::RstStream { stream_id, error_code: reason }.encode(&mut out);
        sender.send(&out);
    }

    fn send_goaway(&mut self, sender: &mut dyn Sender, reason: Reason, debug_data: &[u8]) {
        let last_stream_id = self.streams.goaway_received().unwrap_or(0);
        if !self.streams.record_goaway_sent(last_stream_id) {
            return;
        }
        self.goaway_sent = true;
        let goaway = frame::GoAway { last_stream_id, error_code: reason, debug_data: Bytes::copy_from_slice(debug_data) };
        let mut out = Vec::new();
        goaway.encode(&mut out);
        sender.send(&out);
    }
}

/// Drives one HTTP/2 connection (server role only; no client/h2c upgrade path).
pub struct H2Connection<S> {
    inner: Inner,
    service: S,
    inbound: BytesMut,
}

impl<S: RequestHandler> H2Connection<S> {
    pub fn new(service: S) -> Self {
        Self { inner: Inner::new(), service, inbound: BytesMut::new() }
    }

    fn send_local_settings(&mut self, sender: &mut dyn Sender) {
        let settings = frame::Settings {
            ack: false,
            max_concurrent_streams: Some(128),
            initial_window_size: Some(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            ..Default::default()
        };
        let mut out = Vec::new();
        settings.encode(&mut out);
        sender.send(&out);
    }

    fn fail(&mut self, sender: &mut dyn Sender, error: H2Error) {
        match error {
            H2Error::Connection(reason) => {
                warn!(%reason, "closing connection on protocol error");
                self.inner.send_goaway(sender, reason, &[]);
                sender.close();
            }
            H2Error::Stream { stream_id, reason } => {
                self.inner.reset_stream(sender, stream_id, reason);
            }
        }
    }

    fn dispatch(&mut self, frame: Frame, sender: &mut dyn Sender) -> Result<(), H2Error> {
        if self.inner.streams.header_block_open() {
            if !matches!(frame, Frame::Continuation(_)) {
                return Err(H2Error::Connection(Reason::ProtocolError));
            }
        }

        if let Some(kind) = frame_kind(&frame) {
            let stream_id = frame.stream_id();
            if let Some(stream) = self.inner.streams.get(stream_id) {
                if !stream.accepts_from_peer(kind) {
                    return Err(H2Error::Stream { stream_id, reason: Reason::StreamClosed });
                }
            }
        }

        match frame {
            Frame::Settings(settings) => self.handle_settings(settings, sender)?,
            Frame::Ping(ping) => self.handle_ping(ping, sender),
            Frame::WindowUpdate(update) => self.handle_window_update(update)?,
            Frame::Headers(headers) => self.handle_headers(headers, sender)?,
            Frame::Continuation(cont) => self.handle_continuation(cont, sender)?,
            Frame::Data(data) => self.handle_data(data, sender)?,
            Frame::RstStream(rst) => {
                self.inner.streams.reset(rst.stream_id);
                self.service.on_reset(rst.stream_id, rst.error_code);
            }
            Frame::GoAway(goaway) => {
                self.inner.streams.record_goaway_received(goaway.last_stream_id);
            }
            Frame::Priority(priority) => {
                if let Some(stream) = self.inner.streams.get_mut(priority.stream_id) {
                    stream.weight = priority.weight;
                    stream.parent = priority.dependency;
                }
            }
            Frame::PushPromise(_) => return Err(H2Error::Connection(Reason::ProtocolError)),
        }
        Ok(())
    }

    fn handle_settings(&mut self, settings: frame::Settings, sender: &mut dyn Sender) -> Result<(), H2Error> {
        if settings.ack {
            self.inner.local_settings_acked = true;
            return Ok(());
        }

        if let Some(max_frame_size) = settings.max_frame_size {
            self.inner.peer_max_frame_size = max_frame_size;
        }
        if let Some(header_table_size) = settings.header_table_size {
            self.inner.encoder.set_max_size(header_table_size as usize);
        }
        if let Some(new_initial) = settings.initial_window_size {
            let delta = new_initial as i64 - frame::DEFAULT_INITIAL_WINDOW_SIZE as i64;
            self.inner.streams.apply_initial_window_delta(delta)?;
            self.inner.streams.set_initial_window(new_initial);
        }

        let ack = frame::Settings { ack: true, ..Default::default() };
        let mut out = Vec::new();
        ack.encode(&mut out);
        sender.send(&out);
        Ok(())
    }

    fn handle_ping(&mut self, ping: frame::Ping, sender: &mut dyn Sender) {
        if ping.ack {
            return;
        }
        let pong = frame::Ping { ack: true, payload: ping.payload };
        let mut out = Vec::new();
        pong.encode(&mut out);
        sender.send(&out);
    }

    fn handle_window_update(&mut self, update: frame::WindowUpdate) -> Result<(), H2Error> {
        if update.stream_id == 0 {
            self.inner
                .connection_send_window
                .apply_increment(update.increment)
                .map_err(|_| H2Error::Connection(Reason::FlowControlError))?;
        } else if let Some(stream) = self.inner.streams.get_mut(update.stream_id) {
            stream.send_window.apply_increment(update.increment).map_err(|_| H2Error::Stream {
                stream_id: update.stream_id,
                reason: Reason::FlowControlError,
            })?;
        }
        Ok(())
    }

    fn handle_headers(&mut self, headers: frame::Headers, sender: &mut dyn Sender) -> Result<(), H2Error> {
        let stream_id = headers.stream_id;
        {
            let stream = self.inner.streams.open_peer_initiated(stream_id)?;
            stream.state = if headers.end_stream { State::HalfClosedRemote } else { State::Open };
        }

        self.inner.streams.begin_header_block(stream_id, headers.end_headers)?;

        if headers.end_headers {
            self.finish_header_block(stream_id, headers.header_block_fragment, headers.end_stream, sender)?;
        } else {
            self.inner.in_progress_headers = Some(PartialBlock {
                stream_id,
                fragment: BytesMut::from(&headers.header_block_fragment[..]),
                end_stream: headers.end_stream,
            });
        }
        Ok(())
    }

    fn handle_continuation(&mut self, cont: frame::Continuation, sender: &mut dyn Sender) -> Result<(), H2Error> {
        self.inner.streams.continue_header_block(cont.stream_id, cont.end_headers)?;

        let Some(partial) = self.inner.in_progress_headers.as_mut() else {
            return Err(H2Error::Connection(Reason::ProtocolError));
        };
        if partial.stream_id != cont.stream_id {
            return Err(H2Error::Connection(Reason::ProtocolError));
        }
        partial.fragment.extend_from_slice(&cont.header_block_fragment);

        if cont.end_headers {
            let partial = self.inner.in_progress_headers.take().unwrap();
            self.finish_header_block(partial.stream_id, partial.fragment.freeze(), partial.end_stream, sender)?;
        }
        Ok(())
    }

    fn finish_header_block(
        &mut self,
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        sender: &mut dyn Sender,
    ) -> Result<(), H2Error> {
        let headers = self
            .inner
            .decoder
            .decode_block(&block)
            .map_err(|_| H2Error::Connection(Reason::CompressionError))?;

        let mut responder = Responder { conn: &mut self.inner, sender };
        self.service.on_headers(stream_id, headers, end_stream, &mut responder);
        Ok(())
    }

    fn handle_data(&mut self, data: frame::Data, sender: &mut dyn Sender) -> Result<(), H2Error> {
        self.inner.connection_recv_window.consume(data.flow_len);
        if let Some(stream) = self.inner.streams.get_mut(data.stream_id) {
            stream.recv_window.consume(data.flow_len);
        } else {
            return Err(H2Error::Stream { stream_id: data.stream_id, reason: Reason::StreamClosed });
        }

        if data.end_stream {
            self.inner.streams.apply_end_stream(data.stream_id, Side::Remote)?;
        }

        // emit a window update once half the window has been consumed; keeps the peer streaming.
        if self.inner.connection_recv_window.available() < frame::DEFAULT_INITIAL_WINDOW_SIZE as i64 / 2 {
            let increment = frame::DEFAULT_INITIAL_WINDOW_SIZE;
            self.inner.connection_recv_window.apply_increment(increment).ok();
            let update = frame::WindowUpdate { stream_id: 0, increment };
            let mut out = Vec::new();
            update.encode(&mut out);
            sender.send(&out);
        }

        let mut responder = Responder { conn: &mut self.inner, sender };
        self.service.on_data(data.stream_id, &data.payload, data.end_stream, &mut responder);
        Ok(())
    }
}

impl<S: RequestHandler> Handler for H2Connection<S> {
    fn on_open(&mut self, sender: &mut dyn Sender) {
        self.send_local_settings(sender);
    }

    fn on_data(&mut self, sender: &mut dyn Sender, data: &[u8]) {
        self.inbound.extend_from_slice(data);

        if !self.inner.preface_seen {
            if self.inbound.len() < PREFACE.len() {
                return;
            }
            if &self.inbound[..PREFACE.len()] != PREFACE {
                self.fail(sender, H2Error::Connection(Reason::ProtocolError));
                return;
            }
            let _ = self.inbound.split_to(PREFACE.len());
            self.inner.preface_seen = true;
        }

        let frames = match frame::parse_frames(&mut self.inbound, frame::DEFAULT_MAX_FRAME_SIZE) {
            Ok(frames) => frames,
            Err(e) => {
                self.fail(sender, e);
                return;
            }
        };

        for frame in frames {
            if let Err(e) = self.dispatch(frame, sender) {
                self.fail(sender, e);
                if matches!(e, H2Error::Connection(_)) {
                    return;
                }
            }
        }
    }

    fn on_writable(&mut self, _sender: &mut dyn Sender) {}

    fn on_close(&mut self, reason: CloseReason) {
        trace!(?reason, "http/2 connection closed");
    }

    fn on_error(&mut self, sender: &mut dyn Sender, error: &std::io::Error) {
        warn!(%error, "http/2 connection io error");
        if !self.inner.goaway_sent {
            self.inner.send_goaway(sender, Reason::InternalError, &[]);
        }
    }
}
