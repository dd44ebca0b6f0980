//! RFC 7541 Appendix B: the canonical Huffman code HPACK uses for literal strings.
//!
//! The codes are derived at compile time from the canonical code lengths rather than
//! hand-transcribed bit patterns: shorter codes sort first, and within equal length lower
//! symbol values get the lower code, exactly as the RFC's own table is constructed.

use std::sync::OnceLock;

/// EOS is symbol 256: a 30-bit all-ones code used only for padding validation, never emitted.
const EOS_SYMBOL: usize = 256;

#[rustfmt::skip]
const CODE_LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28,
    28, 28, 28, 28, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    6, 10, 10, 12, 13, 6, 8, 11, 10, 10, 8, 11, 8, 6, 6, 6,
    5, 5, 5, 6, 6, 6, 6, 6, 6, 6, 7, 8, 15, 6, 12, 10,
    13, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 8, 7, 8, 13, 19, 13, 14, 6,
    15, 5, 6, 5, 6, 5, 6, 6, 6, 5, 7, 7, 6, 6, 6, 5,
    6, 7, 6, 5, 5, 6, 7, 7, 7, 7, 7, 15, 11, 14, 13, 28,
    20, 22, 20, 20, 22, 22, 22, 23, 22, 22, 22, 23, 22, 23, 23, 23,
    23, 23, 24, 24, 22, 23, 24, 23, 23, 23, 23, 23, 23, 23, 23, 24,
    23, 24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23, 23,
    24, 22, 21, 20, 22, 22, 22, 23, 22, 22, 23, 23, 25, 28, 20, 23,
    22, 22, 25, 28, 28, 25, 28, 23, 26, 26, 20, 19, 21, 26, 28, 27,
    27, 27, 20, 24, 20, 21, 21, 22, 21, 21, 23, 22, 22, 25, 25, 25,
    20, 27, 20, 20, 21, 22, 21, 21, 23, 22, 22, 25, 25, 24, 24, 26,
    23, 26, 27, 26, 26, 26, 27, 27, 27, 27, 27, 28, 27, 27, 27, 26,
    30,
];

struct Codes {
    code: [u32; 257],
}

fn build() -> Codes {
    let mut bl_count = [0u32; 32];
    for &len in &CODE_LENGTHS {
        bl_count[len as usize] += 1;
    }
    let mut next_code = [0u32; 32];
    let mut code = 0u32;
    bl_count[0] = 0;
    for bits in 1..32 {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    let mut table = [0u32; 257];
    for (sym, &len) in CODE_LENGTHS.iter().enumerate() {
        table[sym] = next_code[len as usize];
        next_code[len as usize] += 1;
    }
    Codes { code: table }
}

fn codes() -> &'static Codes {
    static CODES: OnceLock<Codes> = OnceLock::new();
    CODES.get_or_init(build)
}

fn code_for(symbol: usize) -> (u32, u8) {
    (codes().code[symbol], CODE_LENGTHS[symbol])
}

/// Length in bytes of `data` once Huffman-encoded.
pub fn encoded_len(data: &[u8]) -> usize {
    let bits: usize = data.iter().map(|&b| CODE_LENGTHS[b as usize] as usize).sum();
    bits.div_ceil(8)
}

/// Encode `data`, padding the final partial octet with EOS's leading 1 bits.
pub fn encode(data: &[u8], out: &mut Vec<u8>) {
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &byte in data {
        let (code, len) = code_for(byte as usize);
        acc = (acc << len) | code as u64;
        acc_bits += len as u32;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out.push((acc >> acc_bits) as u8);
        }
    }

    if acc_bits > 0 {
        let pad = 8 - acc_bits;
        let padded = (acc << pad) | ((1u64 << pad) - 1);
        out.push(padded as u8);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanError {
    InvalidPadding,
    EosInLiteral,
}

/// Decode a Huffman-coded literal. `len` is the encoded byte length from the string's length
/// prefix, not the decoded length.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, HuffmanError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &byte in data {
        acc = (acc << 8) | byte as u64;
        acc_bits += 8;

        loop {
            let mut matched = false;
            for sym in 0..257 {
                let len = CODE_LENGTHS[sym] as u32;
                if len == 0 || len > acc_bits {
                    continue;
                }
                let candidate = ((acc >> (acc_bits - len)) & ((1u64 << len) - 1)) as u32;
                if candidate == codes().code[sym] {
                    if sym == EOS_SYMBOL {
                        return Err(HuffmanError::EosInLiteral);
                    }
                    out.push(sym as u8);
                    acc_bits -= len;
                    acc &= (1u64 << acc_bits) - 1;
                    matched = true;
                    break;
                }
            }
            if !matched {
                break;
            }
        }
    }

    if acc_bits >= 8 {
        return Err(HuffmanError::InvalidPadding);
    }
    if acc_bits > 0 {
        let pad_mask = (1u64 << acc_bits) - 1;
        if acc & pad_mask != pad_mask {
            return Err(HuffmanError::InvalidPadding);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii() {
        let input = b"www.example.com";
        let mut encoded = Vec::new();
        encode(input, &mut encoded);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn round_trips_dates_and_mixed_case() {
        let input = b"Mon, 21 Oct 2013 20:13:21 GMT";
        let mut encoded = Vec::new();
        encode(input, &mut encoded);
        assert_eq!(encoded.len(), encoded_len(input));
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn encoding_shrinks_lowercase_header_values() {
        let input = b"private, max-age=31536000";
        let mut encoded = Vec::new();
        encode(input, &mut encoded);
        assert!(encoded.len() < input.len());
    }
}
