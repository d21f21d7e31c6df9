//! Overlay addresses and the XOR distance metric.
//!
//! An [`Address`] places a node or a chunk in the cluster's address space.
//! Proximity between two addresses is measured by [`Address::distance`]:
//! the bytewise exclusive-or of the two addresses, read as an unsigned
//! big-endian integer. The metric is symmetric, zero only for equal
//! addresses, and is used purely for ordering; it has no cryptographic
//! meaning.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from address-space operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Distance requested between addresses of different lengths.
    #[error("address length mismatch: {left} vs {right} bytes")]
    LengthMismatch {
        /// Length of the left operand in bytes.
        left: usize,
        /// Length of the right operand in bytes.
        right: usize,
    },
}

/// A fixed-length overlay address.
///
/// The length is fixed per deployment (32 bytes for content-derived
/// addresses); addresses are only comparable to addresses of the same
/// length. Immutable once created.
///
/// # Examples
///
/// ```
/// use chunkwarden::Address;
///
/// let a = Address::new(vec![0x00]);
/// let b = Address::new(vec![0x80]);
/// let d = a.distance(&b).expect("equal lengths");
/// assert_eq!(d, b.distance(&a).expect("symmetric"));
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Vec<u8>);

impl Address {
    /// Create an address from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse an address from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(s)?))
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Address length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the address is zero-length.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// XOR distance between `self` and `other`.
    ///
    /// Fails with [`AddressError::LengthMismatch`] when the operands have
    /// different lengths.
    pub fn distance(&self, other: &Address) -> Result<Distance, AddressError> {
        if self.0.len() != other.0.len() {
            return Err(AddressError::LengthMismatch {
                left: self.0.len(),
                right: other.0.len(),
            });
        }
        let xor = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        Ok(Distance(xor))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0))
    }
}

/// XOR distance between two equal-length addresses.
///
/// Ordered by unsigned big-endian magnitude. Only distances derived from
/// the same address length are meaningfully comparable, matching the
/// equal-length requirement of [`Address::distance`].
#[derive(Clone)]
pub struct Distance(Vec<u8>);

impl Distance {
    /// The big-endian distance bytes, including leading zeros.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the distance is zero, i.e. the addresses were equal.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    fn magnitude(&self) -> &[u8] {
        let start = self.0.iter().position(|b| *b != 0).unwrap_or(self.0.len());
        &self.0[start..]
    }
}

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Distance {}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.magnitude();
        let b = other.magnitude();
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric() {
        let x = Address::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let y = Address::new(vec![0x01, 0x02, 0x03, 0x04]);

        let xy = x.distance(&y).expect("equal lengths");
        let yx = y.distance(&x).expect("equal lengths");
        assert_eq!(xy, yx);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let x = Address::new(vec![0xaa, 0xbb]);
        let d = x.distance(&x).expect("equal lengths");
        assert!(d.is_zero());
    }

    #[test]
    fn test_distance_length_mismatch() {
        let x = Address::new(vec![0x01]);
        let y = Address::new(vec![0x01, 0x02]);

        assert_eq!(
            x.distance(&y),
            Err(AddressError::LengthMismatch { left: 1, right: 2 })
        );
    }

    #[test]
    fn test_distance_orders_by_magnitude() {
        let target = Address::new(vec![0x7f]);

        let a = Address::new(vec![0x00]).distance(&target).expect("distance");
        let b = Address::new(vec![0x80]).distance(&target).expect("distance");
        let c = Address::new(vec![0xff]).distance(&target).expect("distance");

        // 0x00^0x7f = 127, 0x80^0x7f = 255, 0xff^0x7f = 128
        assert!(a < c);
        assert!(c < b);
        assert_eq!(a.as_bytes(), &[0x7f]);
        assert_eq!(b.as_bytes(), &[0xff]);
        assert_eq!(c.as_bytes(), &[0x80]);
    }

    #[test]
    fn test_distance_ignores_leading_zeros_in_comparison() {
        let small = Address::new(vec![0x00, 0x00, 0x00, 0x01])
            .distance(&Address::new(vec![0x00, 0x00, 0x00, 0x00]))
            .expect("distance");
        let large = Address::new(vec![0x00, 0x00, 0x01, 0x00])
            .distance(&Address::new(vec![0x00, 0x00, 0x00, 0x00]))
            .expect("distance");

        assert!(small < large);
    }

    #[test]
    fn test_hex_roundtrip() {
        let addr = Address::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let parsed = Address::from_hex(&addr.to_string()).expect("valid hex");
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_serde_roundtrip() {
        let addr = Address::new(vec![1, 2, 3]);
        let json = serde_json::to_string(&addr).expect("serialize");
        let decoded: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(addr, decoded);
    }
}
