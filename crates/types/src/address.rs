// Path: crates/types/src/address.rs
//! The TIMPAL account address: a 48-character textual form derived from
//! `"tmpl" ++ hex(sha256(sha256(public_key)))[..44]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of hex characters that follow the `"tmpl"` prefix.
pub const ADDRESS_HEX_LEN: usize = 44;
/// Total textual length of an address, prefix included.
pub const ADDRESS_LEN: usize = 4 + ADDRESS_HEX_LEN;
const ADDRESS_PREFIX: &str = "tmpl";

/// An error encountered while parsing an address from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The string was not exactly [`ADDRESS_LEN`] bytes long.
    #[error("address must be {ADDRESS_LEN} characters, got {0}")]
    WrongLength(usize),
    /// The string did not start with `"tmpl"`.
    #[error("address must start with \"tmpl\"")]
    MissingPrefix,
    /// The suffix was not valid lowercase hex.
    #[error("address suffix is not valid hex")]
    InvalidHex,
}

/// A TIMPAL account address. Cheap to clone, orderable, and hashable so it
/// can key `BTreeMap`s and be sorted into canonical lists (committees,
/// liveness sets, reward-allocation maps) before hashing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and validates a textual address.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.len() != ADDRESS_LEN {
            return Err(AddressError::WrongLength(s.len()));
        }
        let Some(suffix) = s.strip_prefix(ADDRESS_PREFIX) else {
            return Err(AddressError::MissingPrefix);
        };
        if !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Returns the address as a plain `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The all-zero address, used as a well-formed fallback and as the
    /// sender of genesis-minted rewards.
    pub fn zero() -> Self {
        Self(format!("{ADDRESS_PREFIX}{}", "0".repeat(ADDRESS_HEX_LEN)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let raw = format!("tmpl{}", "a".repeat(ADDRESS_HEX_LEN));
        let addr = Address::parse(&raw).unwrap();
        assert_eq!(addr.as_str(), raw);
        assert_eq!(String::from(addr), raw);
    }

    #[test]
    fn rejects_missing_prefix() {
        let raw = "x".repeat(ADDRESS_LEN);
        assert_eq!(Address::parse(&raw), Err(AddressError::MissingPrefix));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Address::parse("tmpl00"), Err(AddressError::WrongLength(6)));
    }

    #[test]
    fn rejects_non_hex_suffix() {
        let raw = format!("tmpl{}z", "a".repeat(ADDRESS_HEX_LEN - 1));
        assert_eq!(Address::parse(&raw), Err(AddressError::InvalidHex));
    }

    #[test]
    fn orders_lexicographically() {
        let a = Address::parse(&format!("tmpl{}", "0".repeat(ADDRESS_HEX_LEN))).unwrap();
        let b = Address::parse(&format!("tmpl{}", "1".repeat(ADDRESS_HEX_LEN))).unwrap();
        assert!(a < b);
    }
}
