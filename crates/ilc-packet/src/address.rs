//! `IlpAddress`: a dot-separated, validated ILP address.

use std::convert::TryFrom;
use std::fmt;

use quick_error::quick_error;

/// First-segment allocation schemes a node is permitted to use.
const ALLOCATION_SCHEMES: &[&str] = &["g", "private", "example", "peer", "self", "test"];

quick_error! {
    #[derive(Debug, PartialEq, Eq, Clone)]
    pub enum AddressError {
        Empty {
            display("ILP address is empty")
        }
        TooLong(len: usize) {
            display("ILP address is {} bytes, max is 1023", len)
        }
        InvalidSegment(segment: String) {
            display("invalid address segment: {:?}", segment)
        }
        UnknownScheme(scheme: String) {
            display("unknown allocation scheme: {:?}", scheme)
        }
    }
}

const MAX_ADDRESS_LEN: usize = 1023;

/// An immutable, validated ILP address (`g.example.bob`, `test.alice`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct IlpAddress(String);

impl IlpAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, AddressError> {
        let value = value.into();
        validate(&value)?;
        Ok(IlpAddress(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// True if `self` is `other` or a segment-aligned prefix of `other`.
    pub fn is_prefix_of(&self, other: &IlpAddress) -> bool {
        if self.0 == other.0 {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'.')
    }

    /// Appends a segment, producing a new child address.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, AddressError> {
        IlpAddress::new(format!("{}.{}", self.0, suffix))
    }
}

impl fmt::Display for IlpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IlpAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IlpAddress {
    type Error = AddressError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        IlpAddress::new(value)
    }
}

impl TryFrom<&str> for IlpAddress {
    type Error = AddressError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        IlpAddress::new(value)
    }
}

impl From<IlpAddress> for String {
    fn from(addr: IlpAddress) -> String {
        addr.0
    }
}

fn validate(value: &str) -> Result<(), AddressError> {
    if value.is_empty() {
        return Err(AddressError::Empty);
    }
    if value.len() > MAX_ADDRESS_LEN {
        return Err(AddressError::TooLong(value.len()));
    }
    let mut segments = value.split('.');
    let scheme = segments.next().ok_or(AddressError::Empty)?;
    if !ALLOCATION_SCHEMES.contains(&scheme) {
        return Err(AddressError::UnknownScheme(scheme.to_string()));
    }
    for segment in std::iter::once(scheme).chain(segments) {
        if segment.is_empty() || !segment.bytes().all(is_valid_segment_byte) {
            return Err(AddressError::InvalidSegment(segment.to_string()));
        }
    }
    Ok(())
}

fn is_valid_segment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'~' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(IlpAddress::new("g.alice").is_ok());
        assert!(IlpAddress::new("test.connector.sub_1").is_ok());
        assert!(IlpAddress::new("private.node~1").is_ok());
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert_eq!(
            IlpAddress::new("foo.bar"),
            Err(AddressError::UnknownScheme("foo".into()))
        );
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(matches!(
            IlpAddress::new("g..bob"),
            Err(AddressError::InvalidSegment(_))
        ));
    }

    #[test]
    fn prefix_match_is_segment_aligned() {
        let prefix = IlpAddress::new("g.bob").unwrap();
        let full = IlpAddress::new("g.bobby").unwrap();
        let child = IlpAddress::new("g.bob.sub").unwrap();
        assert!(!prefix.is_prefix_of(&full));
        assert!(prefix.is_prefix_of(&child));
        assert!(prefix.is_prefix_of(&prefix));
    }
}
