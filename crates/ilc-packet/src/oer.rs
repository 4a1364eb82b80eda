//! Octet Encoding Rules primitives used by the ILP wire format.
//!
//! Decoding is zero-copy: every variable-length octet string returned here
//! borrows from (or is built as a `Bytes` slice into) the input buffer.

use bytes::{Buf, BufMut, Bytes};
use quick_error::quick_error;

quick_error! {
    #[derive(Debug, PartialEq, Eq, Clone)]
    pub enum OerError {
        BufferUnderflow {
            display("buffer underflow: not enough bytes remaining")
        }
        InvalidLength(len: usize) {
            display("invalid length-of-length: {}", len)
        }
    }
}

pub type OerResult<T> = Result<T, OerError>;

/// Reads a single big-endian `u8`.
pub fn read_u8(buf: &mut Bytes) -> OerResult<u8> {
    if buf.remaining() < 1 {
        return Err(OerError::BufferUnderflow);
    }
    Ok(buf.get_u8())
}

/// Reads a fixed number of raw bytes, zero-copy (a `Bytes` slice aliasing the input).
pub fn read_fixed(buf: &mut Bytes, len: usize) -> OerResult<Bytes> {
    if buf.remaining() < len {
        return Err(OerError::BufferUnderflow);
    }
    Ok(buf.split_to(len))
}

/// Reads an OER variable-length unsigned integer (used for lengths and
/// small integral quantities). Single byte if the top bit is clear;
/// otherwise the low 7 bits give the length-of-length (1..=8), followed by
/// that many big-endian value bytes.
pub fn read_var_uint(buf: &mut Bytes) -> OerResult<u64> {
    let first = read_u8(buf)?;
    if first & 0x80 == 0 {
        return Ok(u64::from(first));
    }
    let length_of_length = (first & 0x7f) as usize;
    if length_of_length == 0 || length_of_length > 8 {
        return Err(OerError::InvalidLength(length_of_length));
    }
    if buf.remaining() < length_of_length {
        return Err(OerError::BufferUnderflow);
    }
    let mut value: u64 = 0;
    for _ in 0..length_of_length {
        value = (value << 8) | u64::from(buf.get_u8());
    }
    Ok(value)
}

/// Reads an OER VarOctetString: a `read_var_uint` length prefix followed by
/// that many raw bytes. Zero-copy: the returned `Bytes` aliases the input.
pub fn read_var_octet_string(buf: &mut Bytes) -> OerResult<Bytes> {
    let len = read_var_uint(buf)? as usize;
    read_fixed(buf, len)
}

/// Encodes `value` as an OER variable-length unsigned integer.
pub fn write_var_uint(value: u64, out: &mut Vec<u8>) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }
    let mut bytes = Vec::with_capacity(8);
    let mut v = value;
    while v > 0 {
        bytes.push((v & 0xff) as u8);
        v >>= 8;
    }
    bytes.reverse();
    out.push(0x80 | bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

/// Encodes `data` as an OER VarOctetString (length prefix + raw bytes).
pub fn write_var_octet_string(data: &[u8], out: &mut Vec<u8>) {
    write_var_uint(data.len() as u64, out);
    out.extend_from_slice(data);
}

/// Writes a fixed-width big-endian `u64`.
pub fn write_u64(value: u64, out: &mut Vec<u8>) {
    out.put_u64(value);
}

/// Reads a fixed-width big-endian `u64`.
pub fn read_u64(buf: &mut Bytes) -> OerResult<u64> {
    if buf.remaining() < 8 {
        return Err(OerError::BufferUnderflow);
    }
    Ok(buf.get_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_uint_single_byte_roundtrip() {
        for v in [0u64, 1, 42, 127] {
            let mut out = Vec::new();
            write_var_uint(v, &mut out);
            assert_eq!(out.len(), 1);
            let mut buf = Bytes::from(out);
            assert_eq!(read_var_uint(&mut buf).unwrap(), v);
        }
    }

    #[test]
    fn var_uint_multi_byte_roundtrip() {
        for v in [128u64, 255, 256, 65535, u64::MAX] {
            let mut out = Vec::new();
            write_var_uint(v, &mut out);
            let mut buf = Bytes::from(out);
            assert_eq!(read_var_uint(&mut buf).unwrap(), v);
        }
    }

    #[test]
    fn var_octet_string_roundtrip() {
        let mut out = Vec::new();
        write_var_octet_string(b"hello ilp", &mut out);
        let mut buf = Bytes::from(out);
        let read = read_var_octet_string(&mut buf).unwrap();
        assert_eq!(&read[..], b"hello ilp");
    }

    #[test]
    fn buffer_underflow_on_short_fixed() {
        let mut buf = Bytes::from_static(&[1, 2]);
        assert_eq!(read_fixed(&mut buf, 3), Err(OerError::BufferUnderflow));
    }

    #[test]
    fn invalid_length_of_length() {
        // top bit set, length-of-length = 9 (> 8)
        let mut buf = Bytes::from_static(&[0x89, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(read_var_uint(&mut buf), Err(OerError::InvalidLength(9)));
    }

    #[test]
    fn no_partial_mutation_on_failure() {
        let original = Bytes::from_static(&[0x82, 0x01]);
        let mut buf = original.clone();
        assert!(read_var_uint(&mut buf).is_err());
        // buf position should be unaffected by a failed multi-byte read in
        // our split_to-based reader: we deliberately read byte-by-byte for
        // the length octets but that inner loop itself is infallible once
        // the remaining check has passed, so the only failure point is the
        // upfront remaining() check, which never mutates buf.
        assert_eq!(buf, original);
    }
}
