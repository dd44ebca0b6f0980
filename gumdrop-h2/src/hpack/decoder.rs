//! RFC 7541 §6 header field representations: the decode half of the codec.

use std::fmt;

use super::{decode_integer, huffman, table, DynamicTable, Header};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    Truncated,
    IntegerOverflow,
    InvalidHuffman,
    UnknownIndex(usize),
    /// A name-only indexed field referenced an index carrying no stored value.
    IndexedWithNoValue,
    /// A dynamic-table-size update exceeded the connection's agreed maximum.
    SizeUpdateTooLarge,
    /// A dynamic-table-size update appeared after the block's first header field.
    SizeUpdateNotAtStart,
    InvalidUtf8,
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated hpack block"),
            Self::IntegerOverflow => write!(f, "hpack integer overflowed u32"),
            Self::InvalidHuffman => write!(f, "invalid huffman literal"),
            Self::UnknownIndex(i) => write!(f, "unknown hpack index {i}"),
            Self::IndexedWithNoValue => write!(f, "indexed field carries no value"),
            Self::SizeUpdateTooLarge => write!(f, "dynamic table size update above agreed maximum"),
            Self::SizeUpdateNotAtStart => write!(f, "dynamic table size update must precede all header fields"),
            Self::InvalidUtf8 => write!(f, "header field is not valid utf-8"),
        }
    }
}

impl std::error::Error for DecoderError {}

impl From<huffman::HuffmanError> for DecoderError {
    fn from(_: huffman::HuffmanError) -> Self {
        Self::InvalidHuffman
    }
}

/// Per-connection HPACK decode state: owns the dynamic table across header blocks.
pub struct Decoder {
    dynamic: DynamicTable,
    max_size_agreed: usize,
}

impl Decoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            dynamic: DynamicTable::new(max_size),
            max_size_agreed: max_size,
        }
    }

    /// Raise or lower the cap this decoder will accept via a size-update instruction, mirroring
    /// a local `SETTINGS_HEADER_TABLE_SIZE` change advertised to the peer.
    pub fn set_max_size_agreed(&mut self, max_size: usize) {
        self.max_size_agreed = max_size;
        if self.dynamic.max_size() > max_size {
            self.dynamic.set_max_size(max_size);
        }
    }

    /// Decode one complete header block (HEADERS payload plus any CONTINUATION payloads,
    /// already concatenated by the caller).
    pub fn decode_block(&mut self, mut buf: &[u8]) -> Result<Vec<Header>, DecoderError> {
        let mut headers = Vec::new();
        let mut seen_field = false;

        while !buf.is_empty() {
            let first = buf[0];

            if first & 0b1000_0000 != 0 {
                // indexed header field
                let (index, len) = decode_integer(buf, 7)?;
                buf = &buf[len..];
                let (name, value) = table::resolve(index as usize, &self.dynamic)
                    .ok_or(DecoderError::UnknownIndex(index as usize))?;
                headers.push(Header { name, value, sensitive: false });
                seen_field = true;
            } else if first & 0b0100_0000 != 0 {
                // literal with incremental indexing
                let (header, len) = self.decode_literal(buf, 6)?;
                buf = &buf[len..];
                self.dynamic.insert(header.name.clone(), header.value.clone());
                headers.push(header);
                seen_field = true;
            } else if first & 0b0010_0000 != 0 {
                // dynamic table size update
                if seen_field {
                    return Err(DecoderError::SizeUpdateNotAtStart);
                }
                let (size, len) = decode_integer(buf, 5)?;
                buf = &buf[len..];
                if size as usize > self.max_size_agreed {
                    return Err(DecoderError::SizeUpdateTooLarge);
                }
                self.dynamic.set_max_size(size as usize);
            } else if first & 0b0001_0000 != 0 {
                // literal never indexed
                let (mut header, len) = self.decode_literal(buf, 4)?;
                buf = &buf[len..];
                header.sensitive = true;
                headers.push(header);
                seen_field = true;
            } else {
                // literal without indexing
                let (header, len) = self.decode_literal(buf, 4)?;
                buf = &buf[len..];
                headers.push(header);
                seen_field = true;
            }
        }

        Ok(headers)
    }

    fn decode_literal(&self, buf: &[u8], prefix_bits: u8) -> Result<(Header, usize), DecoderError> {
        let (index, mut consumed) = decode_integer(buf, prefix_bits)?;

        let name = if index == 0 {
            let (s, len) = decode_string(&buf[consumed..])?;
            consumed += len;
            s
        } else {
            let (name, _) =
                table::resolve(index as usize, &self.dynamic).ok_or(DecoderError::UnknownIndex(index as usize))?;
            name
        };

        let (value, len) = decode_string(&buf[consumed..])?;
        consumed += len;

        Ok((Header { name, value, sensitive: false }, consumed))
    }
}

/// RFC 7541 §5.2 string literal: a 7-bit-prefixed length with the Huffman bit as the MSB.
fn decode_string(buf: &[u8]) -> Result<(String, usize), DecoderError> {
    let first = *buf.first().ok_or(DecoderError::Truncated)?;
    let huffman_encoded = first & 0b1000_0000 != 0;
    let (len, prefix_len) = decode_integer(buf, 7)?;
    let len = len as usize;
    let start = prefix_len;
    let end = start.checked_add(len).ok_or(DecoderError::IntegerOverflow)?;
    let bytes = buf.get(start..end).ok_or(DecoderError::Truncated)?;

    let decoded = if huffman_encoded {
        huffman::decode(bytes)?
    } else {
        bytes.to_vec()
    };

    let s = String::from_utf8(decoded).map_err(|_| DecoderError::InvalidUtf8)?;
    Ok((s, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpack::Encoder;

    #[test]
    fn decodes_indexed_pseudo_headers() {
        let mut decoder = Decoder::new(4096);
        // :method: GET is static index 2.
        let headers = decoder.decode_block(&[0x82]).unwrap();
        assert_eq!(headers, vec![Header { name: ":method".into(), value: "GET".into(), sensitive: false }]);
    }

    #[test]
    fn rejects_size_update_after_a_header_field() {
        let mut decoder = Decoder::new(4096);
        let mut block = vec![0x82]; // :method: GET
        block.push(0x20); // dynamic table size update, value 0, out of place
        assert_eq!(decoder.decode_block(&block), Err(DecoderError::SizeUpdateNotAtStart));
    }

    #[test]
    fn round_trips_through_the_encoder() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new(4096);

        let headers = vec![
            Header { name: ":method".into(), value: "POST".into(), sensitive: false },
            Header { name: "x-custom-header".into(), value: "some value here".into(), sensitive: false },
            Header { name: "authorization".into(), value: "Bearer secret".into(), sensitive: true },
        ];

        let mut block = Vec::new();
        encoder.encode(&headers, &mut block);
        let decoded = decoder.decode_block(&block).unwrap();

        assert_eq!(decoded[0].name, ":method");
        assert_eq!(decoded[0].value, "POST");
        assert_eq!(decoded[1].name, "x-custom-header");
        assert_eq!(decoded[2].value, "Bearer secret");
    }
}
