//! ILP error codes: three ASCII characters, class + two digits.

use std::convert::TryFrom;
use std::fmt;

/// Which retry semantics an [`ErrorCode`] implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// `F` — the packet should not be retried unmodified.
    Final,
    /// `T` — a temporary condition; retrying later may succeed.
    Temporary,
    /// `R` — relative to this node; a direct ancestor caused it.
    Relative,
}

/// A three-character ILP error code, e.g. `F02`, `T05`, `R00`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct ErrorCode([u8; 3]);

macro_rules! code {
    ($name:ident, $bytes:expr) => {
        pub const $name: ErrorCode = ErrorCode(*$bytes);
    };
}

impl ErrorCode {
    code!(F00_BAD_REQUEST, b"F00");
    code!(F02_UNREACHABLE, b"F02");
    code!(F04_INSUFFICIENT_DST_AMOUNT, b"F04");
    code!(F05_WRONG_CONDITION, b"F05");
    code!(F06_UNEXPECTED_PAYMENT, b"F06");
    code!(F07_CANNOT_RECEIVE, b"F07");
    code!(F08_AMOUNT_TOO_LARGE, b"F08");
    code!(F99_APPLICATION_ERROR, b"F99");

    code!(T00_INTERNAL_ERROR, b"T00");
    code!(T01_PEER_UNREACHABLE, b"T01");
    code!(T02_PEER_BUSY, b"T02");
    code!(T03_CONNECTOR_BUSY, b"T03");
    code!(T04_INSUFFICIENT_LIQUIDITY, b"T04");
    code!(T05_RATE_LIMITED, b"T05");
    code!(T99_APPLICATION_ERROR, b"T99");

    code!(R00_TRANSFER_TIMED_OUT, b"R00");
    code!(R01_INSUFFICIENT_LIQUIDITY, b"R01");
    code!(R99_APPLICATION_ERROR, b"R99");

    pub fn class(&self) -> ErrorClass {
        match self.0[0] {
            b'F' => ErrorClass::Final,
            b'T' => ErrorClass::Temporary,
            b'R' => ErrorClass::Relative,
            _ => ErrorClass::Final,
        }
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCode({})", self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidErrorCode;

impl TryFrom<&[u8]> for ErrorCode {
    type Error = InvalidErrorCode;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase_or_digit) {
            return Err(InvalidErrorCode);
        }
        if !matches!(bytes[0], b'F' | b'T' | b'R') {
            return Err(InvalidErrorCode);
        }
        let mut out = [0u8; 3];
        out.copy_from_slice(bytes);
        Ok(ErrorCode(out))
    }
}

impl TryFrom<&str> for ErrorCode {
    type Error = InvalidErrorCode;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        ErrorCode::try_from(s.as_bytes())
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = InvalidErrorCode;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        ErrorCode::try_from(s.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str().to_string()
    }
}

trait AsciiUppercaseOrDigit {
    fn is_ascii_uppercase_or_digit(&self) -> bool;
}

impl AsciiUppercaseOrDigit for u8 {
    fn is_ascii_uppercase_or_digit(&self) -> bool {
        self.is_ascii_uppercase() || self.is_ascii_digit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_codes_roundtrip_through_bytes() {
        assert_eq!(ErrorCode::try_from("F02").unwrap(), ErrorCode::F02_UNREACHABLE);
        assert_eq!(ErrorCode::F02_UNREACHABLE.class(), ErrorClass::Final);
        assert_eq!(ErrorCode::T05_RATE_LIMITED.class(), ErrorClass::Temporary);
        assert_eq!(ErrorCode::R00_TRANSFER_TIMED_OUT.class(), ErrorClass::Relative);
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(ErrorCode::try_from("X01").is_err());
        assert!(ErrorCode::try_from("F1").is_err());
    }
}
