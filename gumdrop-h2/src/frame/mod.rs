//! RFC 7540 §4: the 9-octet frame header and the ten frame types this implementation handles.
//! Unknown frame types are parsed far enough to skip their payload and otherwise discarded.

mod data;
mod head;
mod headers;
mod settings;

pub use data::{Data, GoAway, Ping, Priority, RstStream, WindowUpdate};
pub use head::{Head, Kind, StreamId, HEADER_LEN};
pub use headers::{Continuation, Headers, PushPromise, StreamDependency};
pub use settings::{Settings, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, MAX_INITIAL_WINDOW_SIZE};

use crate::error::{H2Error, Reason};

#[derive(Debug, Clone)]
pub enum Frame {
    Data(data::Data),
    Headers(headers::Headers),
    Priority(data::Priority),
    RstStream(data::RstStream),
    Settings(settings::Settings),
    PushPromise(headers::PushPromise),
    Ping(data::Ping),
    GoAway(data::GoAway),
    WindowUpdate(data::WindowUpdate),
    Continuation(headers::Continuation),
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::Data(f) => f.stream_id,
            Self::Headers(f) => f.stream_id,
            Self::Priority(f) => f.stream_id,
            Self::RstStream(f) => f.stream_id,
            Self::Settings(_) => 0,
            Self::PushPromise(f) => f.stream_id,
            Self::Ping(_) => 0,
            Self::GoAway(_) => 0,
            Self::WindowUpdate(f) => f.stream_id,
            Self::Continuation(f) => f.stream_id,
        }
    }
}

/// Parse as many complete frames as `buf` holds, advancing past each one consumed. On return,
/// any bytes left in `buf` are the start of a frame too short to fully parse yet.
pub fn parse_frames(buf: &mut bytes::BytesMut, max_frame_size: u32) -> Result<Vec<Frame>, H2Error> {
    let mut frames = Vec::new();

    loop {
        if buf.len() < HEADER_LEN {
            break;
        }
        let head = Head::parse(&buf[..HEADER_LEN]);
        if head.length > max_frame_size {
            return Err(H2Error::Connection(Reason::FrameSizeError));
        }
        let total = HEADER_LEN + head.length as usize;
        if buf.len() < total {
            break;
        }

        head.validate_stream_id()?;

        let payload = &buf[HEADER_LEN..total];
        let frame = match head.kind {
            Kind::Data => Some(Frame::Data(data::Data::parse(head, payload)?)),
            Kind::Headers => Some(Frame::Headers(headers::Headers::parse(head, payload)?)),
            Kind::Priority => {
                if payload.len() != 5 {
                    return Err(H2Error::Connection(Reason::FrameSizeError));
                }
                Some(Frame::Priority(data::Priority::parse(head, payload)?))
            }
            Kind::RstStream => Some(Frame::RstStream(data::RstStream::parse(head, payload)?)),
            Kind::Settings => Some(Frame::Settings(settings::Settings::parse(head, payload)?)),
            Kind::PushPromise => Some(Frame::PushPromise(headers::PushPromise::parse(head, payload)?)),
            Kind::Ping => Some(Frame::Ping(data::Ping::parse(head, payload)?)),
            Kind::GoAway => Some(Frame::GoAway(data::GoAway::parse(payload)?)),
            Kind::WindowUpdate => Some(Frame::WindowUpdate(data::WindowUpdate::parse(head, payload)?)),
            Kind::Continuation => Some(Frame::Continuation(headers::Continuation::parse(head, payload))),
            Kind::Unknown(_) => None,
        };

        if let Some(frame) = frame {
            frames.push(frame);
        }

        let _ = buf.split_to(total);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn ping_bytes(stream_id: u32, ack: bool) -> Vec<u8> {
        let ping = data::Ping { ack, payload: [1, 2, 3, 4, 5, 6, 7, 8] };
        let mut out = Vec::new();
        ping.encode(&mut out);
        let _ = stream_id;
        out
    }

    #[test]
    fn leaves_an_incomplete_frame_in_place() {
        let mut buf = BytesMut::new();
        let full = ping_bytes(0, false);
        buf.put_slice(&full[..full.len() - 1]);
        let frames = parse_frames(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buf.len(), full.len() - 1);
    }

    #[test]
    fn parses_every_complete_frame_buffered() {
        let mut buf = BytesMut::new();
        buf.put_slice(&ping_bytes(0, false));
        buf.put_slice(&ping_bytes(0, true));
        let frames = parse_frames(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_settings_frame_on_a_stream() {
        let mut buf = BytesMut::new();
        let head = Head { kind: Kind::Settings, length: 0, flags: 0, stream_id: 1 };
        let mut raw = Vec::new();
        head.encode(head::kind_byte(Kind::Settings), &mut raw);
        buf.put_slice(&raw);
        let err = parse_frames(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert_eq!(err, H2Error::Connection(Reason::ProtocolError));
    }

    #[test]
    fn rejects_frame_over_max_size() {
        let mut buf = BytesMut::new();
        let head = Head { kind: Kind::Ping, length: DEFAULT_MAX_FRAME_SIZE + 1, flags: 0, stream_id: 0 };
        let mut raw = Vec::new();
        head.encode(head::kind_byte(Kind::Ping), &mut raw);
        buf.put_slice(&raw);
        let err = parse_frames(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert_eq!(err, H2Error::Connection(Reason::FrameSizeError));
    }
}
