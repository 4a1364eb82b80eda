//! ILP packet model: `Prepare`, `Fulfill`, `Reject`, and the `Packet` union
//! that wraps them. Parsing and serialization are byte-exact: `parse(serialize(p))
//! == p` for every valid packet (§8.2 of the connector spec).

use std::convert::TryFrom;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_error::quick_error;

use crate::address::{AddressError, IlpAddress};
use crate::error_code::{ErrorCode, InvalidErrorCode};
use crate::oer;

pub const TYPE_PREPARE: u8 = 12;
pub const TYPE_FULFILL: u8 = 13;
pub const TYPE_REJECT: u8 = 14;

pub const MAX_DATA_LEN: usize = 32_767;
pub const MAX_REJECT_MESSAGE_LEN: usize = 8_192;
const CONDITION_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 17;

quick_error! {
    #[derive(Debug, PartialEq, Eq, Clone)]
    pub enum ParseError {
        Oer(err: oer::OerError) {
            display("OER decoding error: {}", err)
            from()
        }
        Address(err: AddressError) {
            display("invalid ILP address: {}", err)
            from()
        }
        ErrorCode(err: InvalidErrorCode) {
            display("invalid ILP error code")
        }
        UnknownType(byte: u8) {
            display("unknown packet type byte: {}", byte)
        }
        InvalidTimestamp {
            display("malformed ILP timestamp")
        }
        DataTooLong(len: usize) {
            display("data field is {} bytes, max is {}", len, MAX_DATA_LEN)
        }
        MessageTooLong(len: usize) {
            display("reject message is {} bytes, max is {}", len, MAX_REJECT_MESSAGE_LEN)
        }
        TrailingBytes {
            display("trailing bytes after packet body")
        }
    }
}

impl From<InvalidErrorCode> for ParseError {
    fn from(_: InvalidErrorCode) -> Self {
        ParseError::ErrorCode(InvalidErrorCode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub amount: u64,
    pub expires_at: SystemTime,
    pub execution_condition: [u8; CONDITION_LEN],
    pub destination: IlpAddress,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfill {
    pub fulfillment: [u8; CONDITION_LEN],
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub code: ErrorCode,
    pub triggered_by: Option<IlpAddress>,
    pub message: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Prepare(Prepare),
    Fulfill(Fulfill),
    Reject(Reject),
}

impl Packet {
    pub fn parse(mut bytes: Bytes) -> Result<Self, ParseError> {
        let type_byte = oer::read_u8(&mut bytes)?;
        let mut body = oer::read_var_octet_string(&mut bytes)?;
        if bytes.has_remaining() {
            return Err(ParseError::TrailingBytes);
        }
        let packet = match type_byte {
            TYPE_PREPARE => Packet::Prepare(Prepare::parse_body(&mut body)?),
            TYPE_FULFILL => Packet::Fulfill(Fulfill::parse_body(&mut body)?),
            TYPE_REJECT => Packet::Reject(Reject::parse_body(&mut body)?),
            other => return Err(ParseError::UnknownType(other)),
        };
        if body.has_remaining() {
            return Err(ParseError::TrailingBytes);
        }
        Ok(packet)
    }

    pub fn serialize(&self) -> Bytes {
        match self {
            Packet::Prepare(p) => p.serialize(),
            Packet::Fulfill(f) => f.serialize(),
            Packet::Reject(r) => r.serialize(),
        }
    }
}

use bytes::Buf;

fn write_envelope(type_byte: u8, body: Vec<u8>) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + 10);
    out.extend_from_slice(&[type_byte]);
    let mut framed = Vec::with_capacity(body.len() + 9);
    oer::write_var_octet_string(&body, &mut framed);
    out.extend_from_slice(&framed);
    out.freeze()
}

fn write_timestamp(t: SystemTime, out: &mut Vec<u8>) {
    let dt: DateTime<Utc> = t.into();
    let s = dt.format("%Y%m%d%H%M%S%3f").to_string();
    debug_assert_eq!(s.len(), TIMESTAMP_LEN);
    out.extend_from_slice(s.as_bytes());
}

fn read_timestamp(buf: &mut Bytes) -> Result<SystemTime, ParseError> {
    let raw = oer::read_fixed(buf, TIMESTAMP_LEN)?;
    let s = std::str::from_utf8(&raw).map_err(|_| ParseError::InvalidTimestamp)?;
    let naive = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S%3f")
        .map_err(|_| ParseError::InvalidTimestamp)?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).into())
}

impl Prepare {
    fn parse_body(buf: &mut Bytes) -> Result<Self, ParseError> {
        let amount = oer::read_u64(buf)?;
        let expires_at = read_timestamp(buf)?;
        let condition_bytes = oer::read_fixed(buf, CONDITION_LEN)?;
        let mut execution_condition = [0u8; CONDITION_LEN];
        execution_condition.copy_from_slice(&condition_bytes);
        let destination_bytes = oer::read_var_octet_string(buf)?;
        let destination = IlpAddress::new(
            std::str::from_utf8(&destination_bytes)
                .map_err(|_| AddressError::InvalidSegment(String::new()))?,
        )?;
        let data = oer::read_var_octet_string(buf)?;
        if data.len() > MAX_DATA_LEN {
            return Err(ParseError::DataTooLong(data.len()));
        }
        Ok(Prepare {
            amount,
            expires_at,
            execution_condition,
            destination,
            data,
        })
    }

    pub fn serialize(&self) -> Bytes {
        let mut body = Vec::new();
        oer::write_u64(self.amount, &mut body);
        write_timestamp(self.expires_at, &mut body);
        body.extend_from_slice(&self.execution_condition);
        oer::write_var_octet_string(self.destination.as_str().as_bytes(), &mut body);
        oer::write_var_octet_string(&self.data, &mut body);
        write_envelope(TYPE_PREPARE, body)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

impl Fulfill {
    fn parse_body(buf: &mut Bytes) -> Result<Self, ParseError> {
        let fulfillment_bytes = oer::read_fixed(buf, CONDITION_LEN)?;
        let mut fulfillment = [0u8; CONDITION_LEN];
        fulfillment.copy_from_slice(&fulfillment_bytes);
        let data = oer::read_var_octet_string(buf)?;
        if data.len() > MAX_DATA_LEN {
            return Err(ParseError::DataTooLong(data.len()));
        }
        Ok(Fulfill { fulfillment, data })
    }

    pub fn serialize(&self) -> Bytes {
        let mut body = Vec::new();
        body.extend_from_slice(&self.fulfillment);
        oer::write_var_octet_string(&self.data, &mut body);
        write_envelope(TYPE_FULFILL, body)
    }
}

impl Reject {
    fn parse_body(buf: &mut Bytes) -> Result<Self, ParseError> {
        let code_bytes = oer::read_fixed(buf, 3)?;
        let code = ErrorCode::try_from(&code_bytes[..])?;
        let triggered_by_bytes = oer::read_var_octet_string(buf)?;
        let triggered_by = if triggered_by_bytes.is_empty() {
            None
        } else {
            Some(IlpAddress::new(
                std::str::from_utf8(&triggered_by_bytes)
                    .map_err(|_| AddressError::InvalidSegment(String::new()))?,
            )?)
        };
        let message_bytes = oer::read_var_octet_string(buf)?;
        if message_bytes.len() > MAX_REJECT_MESSAGE_LEN {
            return Err(ParseError::MessageTooLong(message_bytes.len()));
        }
        let message = String::from_utf8_lossy(&message_bytes).into_owned();
        let data = oer::read_var_octet_string(buf)?;
        if data.len() > MAX_DATA_LEN {
            return Err(ParseError::DataTooLong(data.len()));
        }
        Ok(Reject {
            code,
            triggered_by,
            message,
            data,
        })
    }

    pub fn serialize(&self) -> Bytes {
        let mut body = Vec::new();
        body.extend_from_slice(self.code.as_bytes());
        let triggered_by = self
            .triggered_by
            .as_ref()
            .map(|a| a.as_str().as_bytes())
            .unwrap_or(b"");
        oer::write_var_octet_string(triggered_by, &mut body);
        oer::write_var_octet_string(self.message.as_bytes(), &mut body);
        oer::write_var_octet_string(&self.data, &mut body);
        write_envelope(TYPE_REJECT, body)
    }
}

/// Checks whether `fulfillment` satisfies `condition`, per the preimage
/// commitment rule `sha256(fulfillment) == condition`. Pure function; the
/// caller decides when to invoke it (§4.2).
pub fn check_condition(condition: &[u8; 32], fulfillment: &[u8; 32]) -> bool {
    let digest = ring::digest::digest(&ring::digest::SHA256, fulfillment);
    digest.as_ref() == condition
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_prepare() -> Prepare {
        Prepare {
            amount: 1000,
            expires_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            execution_condition: [7u8; 32],
            destination: IlpAddress::new("g.bob").unwrap(),
            data: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn prepare_roundtrip_is_byte_identical() {
        let prepare = sample_prepare();
        let bytes = prepare.serialize();
        let parsed = Packet::parse(bytes.clone()).unwrap();
        assert_eq!(parsed, Packet::Prepare(prepare));
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn fulfill_roundtrip() {
        let fulfill = Fulfill {
            fulfillment: [9u8; 32],
            data: Bytes::from_static(b"data"),
        };
        let bytes = fulfill.serialize();
        assert_eq!(Packet::parse(bytes.clone()).unwrap(), Packet::Fulfill(fulfill));
    }

    #[test]
    fn reject_roundtrip_with_triggered_by() {
        let reject = Reject {
            code: ErrorCode::F02_UNREACHABLE,
            triggered_by: Some(IlpAddress::new("g.connector").unwrap()),
            message: "no route".to_string(),
            data: Bytes::new(),
        };
        let bytes = reject.serialize();
        let parsed = Packet::parse(bytes.clone()).unwrap();
        assert_eq!(parsed, Packet::Reject(reject));
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn reject_roundtrip_without_triggered_by() {
        let reject = Reject {
            code: ErrorCode::T00_INTERNAL_ERROR,
            triggered_by: None,
            message: String::new(),
            data: Bytes::new(),
        };
        let bytes = reject.serialize();
        assert_eq!(Packet::parse(bytes).unwrap(), Packet::Reject(reject));
    }

    #[test]
    fn condition_check_matches_sha256_preimage() {
        let fulfillment = [0u8; 32];
        let digest = ring::digest::digest(&ring::digest::SHA256, &fulfillment);
        let mut condition = [0u8; 32];
        condition.copy_from_slice(digest.as_ref());
        assert!(check_condition(&condition, &fulfillment));
        assert!(!check_condition(&condition, &[1u8; 32]));
    }

    #[test]
    fn rejects_unknown_type_byte() {
        let mut bytes = vec![99u8];
        oer::write_var_octet_string(b"", &mut bytes);
        let err = Packet::parse(Bytes::from(bytes)).unwrap_err();
        assert_eq!(err, ParseError::UnknownType(99));
    }

    #[test]
    fn rejects_oversized_data() {
        let mut prepare = sample_prepare();
        prepare.data = Bytes::from(vec![0u8; MAX_DATA_LEN + 1]);
        let bytes = prepare.serialize();
        assert_eq!(
            Packet::parse(bytes),
            Err(ParseError::DataTooLong(MAX_DATA_LEN + 1))
        );
    }

    #[test]
    fn expiry_check() {
        let prepare = sample_prepare();
        assert!(!prepare.is_expired(prepare.expires_at - Duration::from_secs(1)));
        assert!(prepare.is_expired(prepare.expires_at));
    }

    #[test]
    fn fulfill_matches_known_wire_fixture() {
        // type byte 0x0d, body length 0x21 (33: 32-byte fulfillment + a
        // single zero-length-octet-string byte for empty `data`).
        let expected =
            hex::decode("0d21000000000000000000000000000000000000000000000000000000000000000000").unwrap();
        let fulfill = Fulfill {
            fulfillment: [0u8; 32],
            data: Bytes::new(),
        };
        assert_eq!(fulfill.serialize(), Bytes::from(expected));
    }
}
