//! RFC 7541 §2.3 indexing space: the fixed static table plus the per-connection dynamic table.

use std::collections::VecDeque;

/// RFC 7541 Appendix A, verbatim order (index 1..=61).
pub static STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// RFC 7541 §4.1: every entry costs its name and value octet lengths plus 32 bytes of overhead.
pub fn entry_size(name: &str, value: &str) -> usize {
    name.len() + value.len() + 32
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

/// The FIFO of headers a HPACK codec has learned, evicted oldest-first once `size` exceeds
/// `max_size`. Indexed most-recent-first, contiguous with the static table (index `62` is the
/// most recently inserted entry).
#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Apply a dynamic-table-size update signalled on the wire; evicts until the new cap holds.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_fit();
    }

    pub fn insert(&mut self, name: String, value: String) {
        let cost = entry_size(&name, &value);
        self.entries.push_front(Entry { name, value });
        self.size += cost;
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(entry) => self.size -= entry_size(&entry.name, &entry.value),
                None => break,
            }
        }
    }

    /// `index` is 0-based within the dynamic table (most-recent-first).
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        self.entries.get(index).map(|e| (e.name.as_str(), e.value.as_str()))
    }
}

/// Resolve a 1-based HPACK index (contiguous across static then dynamic) into a name/value pair.
/// Returns `None` if it falls in neither table.
pub fn resolve(index: usize, dynamic: &DynamicTable) -> Option<(String, String)> {
    if index == 0 {
        return None;
    }
    let index = index - 1;
    if index < STATIC_TABLE.len() {
        let (name, value) = STATIC_TABLE[index];
        return Some((name.to_string(), value.to_string()));
    }
    dynamic
        .get(index - STATIC_TABLE.len())
        .map(|(name, value)| (name.to_string(), value.to_string()))
}
