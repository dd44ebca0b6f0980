//! RFC 7541 §6 representation selection: the encode half of the codec.

use super::{encode_integer, huffman, table, DynamicTable, Header};

/// Header names sent as never-indexed literals by default, regardless of the caller's wishes,
/// since they routinely carry credentials that must not leak into the shared dynamic table.
const SENSITIVE_BY_DEFAULT: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Per-connection HPACK encode state: tracks this side's belief about what the peer's decoder
/// has in its dynamic table, so indexed references stay valid.
pub struct Encoder {
    dynamic: DynamicTable,
    pending_size_update: Option<usize>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            dynamic: DynamicTable::new(4096),
            pending_size_update: None,
        }
    }

    /// Record a change to the table size cap advertised by the peer (via `SETTINGS` or a local
    /// decision); the next `encode` call emits a size-update instruction before any header.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.dynamic.set_max_size(max_size);
        self.pending_size_update = Some(max_size);
    }

    pub fn encode(&mut self, headers: &[Header], out: &mut Vec<u8>) {
        if let Some(size) = self.pending_size_update.take() {
            encode_integer(size as u64, 5, 0b0010_0000, out);
        }

        for header in headers {
            self.encode_one(header, out);
        }
    }

    fn encode_one(&mut self, header: &Header, out: &mut Vec<u8>) {
        if let Some(index) = find_exact(&header.name, &header.value, &self.dynamic) {
            encode_integer(index as u64, 7, 0b1000_0000, out);
            return;
        }

        let sensitive = header.sensitive || SENSITIVE_BY_DEFAULT.contains(&header.name.as_str());
        let name_index = find_name(&header.name, &self.dynamic);

        if sensitive {
            encode_name(name_index, header, 4, 0b0001_0000, out);
            return;
        }

        encode_name(name_index, header, 6, 0b0100_0000, out);
        self.dynamic.insert(header.name.clone(), header.value.clone());
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_name(name_index: Option<usize>, header: &Header, prefix_bits: u8, prefix_flags: u8, out: &mut Vec<u8>) {
    match name_index {
        Some(index) => encode_integer(index as u64, prefix_bits, prefix_flags, out),
        None => {
            out.push(prefix_flags);
            encode_string(&header.name, out);
        }
    }
    encode_string(&header.value, out);
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let huffman_len = huffman::encoded_len(s.as_bytes());
    if huffman_len < s.len() {
        encode_integer(huffman_len as u64, 7, 0b1000_0000, out);
        huffman::encode(s.as_bytes(), out);
    } else {
        encode_integer(s.len() as u64, 7, 0, out);
        out.extend_from_slice(s.as_bytes());
    }
}

fn find_exact(name: &str, value: &str, dynamic: &DynamicTable) -> Option<usize> {
    for (i, &(sname, svalue)) in table::STATIC_TABLE.iter().enumerate() {
        if sname == name && svalue == value {
            return Some(i + 1);
        }
    }
    for i in 0..dynamic.len() {
        if let Some((dname, dvalue)) = dynamic.get(i) {
            if dname == name && dvalue == value {
                return Some(table::STATIC_TABLE.len() + i + 1);
            }
        }
    }
    None
}

fn find_name(name: &str, dynamic: &DynamicTable) -> Option<usize> {
    for (i, &(sname, _)) in table::STATIC_TABLE.iter().enumerate() {
        if sname == name {
            return Some(i + 1);
        }
    }
    for i in 0..dynamic.len() {
        if let Some((dname, _)) = dynamic.get(i) {
            if dname == name {
                return Some(table::STATIC_TABLE.len() + i + 1);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpack::Decoder;

    #[test]
    fn reuses_dynamic_table_entries_across_calls() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new(4096);

        let headers = vec![Header { name: "x-trace-id".into(), value: "abc123".into(), sensitive: false }];

        let mut first = Vec::new();
        encoder.encode(&headers, &mut first);
        let mut second = Vec::new();
        encoder.encode(&headers, &mut second);

        // the second call should be shorter: it can reference the dynamic-table entry the
        // first call inserted instead of re-emitting the literal.
        assert!(second.len() < first.len());

        decoder.decode_block(&first).unwrap();
        let decoded = decoder.decode_block(&second).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn never_indexes_authorization_by_default() {
        let mut encoder = Encoder::new();
        let headers = vec![Header { name: "authorization".into(), value: "Bearer x".into(), sensitive: false }];
        let mut out = Vec::new();
        encoder.encode(&headers, &mut out);
        assert_eq!(out[0] & 0b1111_0000, 0b0001_0000);
    }
}
