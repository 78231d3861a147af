//! 160-bit identifier space shared by nodes and keys (spec.md §3).

use std::fmt;

/// Number of bits in the identifier space. Finger tables have exactly this
/// many entries.
pub const M: usize = 160;
const BYTES: usize = M / 8;

/// A point in the `[0, 2^160)` identifier space, big-endian byte order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; BYTES]);

impl Id {
    pub const ZERO: Id = Id([0u8; BYTES]);

    pub fn from_bytes(bytes: [u8; BYTES]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BYTES] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Parses a big-endian byte slice into an `Id`, right-padding on the
    /// left with zeros if shorter than `BYTES` and truncating if longer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0u8; BYTES];
        if bytes.len() >= BYTES {
            buf.copy_from_slice(&bytes[bytes.len() - BYTES..]);
        } else {
            buf[BYTES - bytes.len()..].copy_from_slice(bytes);
        }
        Id(buf)
    }

    /// Hashes an address string down to its identifier via blake3,
    /// truncated to the first 160 bits. See DESIGN.md for why blake3
    /// (the teacher's hash crate) stands in for the spec's unspecified
    /// "160-bit cryptographic digest".
    pub fn digest(address: &str) -> Self {
        let hash = blake3::hash(address.as_bytes());
        Id::from_slice(&hash.as_bytes()[..BYTES])
    }

    /// `2^i mod 2^160`, for finger table offsets.
    pub fn pow2(i: usize) -> Self {
        assert!(i < M);
        let mut buf = [0u8; BYTES];
        let byte_index = BYTES - 1 - i / 8;
        buf[byte_index] = 1 << (i % 8);
        Id(buf)
    }

    /// `(self + other) mod 2^160`.
    pub fn wrapping_add(&self, other: &Id) -> Id {
        let mut result = [0u8; BYTES];
        let mut carry: u16 = 0;
        for i in (0..BYTES).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            result[i] = sum as u8;
            carry = sum >> 8;
        }
        Id(result)
    }

    /// `(self + 2^i) mod 2^160`.
    pub fn add_pow2(&self, i: usize) -> Id {
        self.wrapping_add(&Id::pow2(i))
    }

    /// `(self - other) mod 2^160`.
    pub fn wrapping_sub(&self, other: &Id) -> Id {
        let mut result = [0u8; BYTES];
        let mut borrow: i16 = 0;
        for i in (0..BYTES).rev() {
            let mut diff = self.0[i] as i16 - other.0[i] as i16 - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            result[i] = diff as u8;
        }
        Id(result)
    }

    /// Whether `self` lies in the modular interval `(start, end]`, wrapping
    /// around 2^160 when `start >= end`. Matches `is_in_interval` in the
    /// original source and §3's interval notation.
    pub fn is_between(&self, start: &Id, end: &Id) -> bool {
        if start < end {
            start < self && self <= end
        } else if start == end {
            // full ring: every id except start itself is "in" (start, start]
            self != start
        } else {
            start < self || self <= end
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Id::digest("127.0.0.1:9000"), Id::digest("127.0.0.1:9000"));
        assert_ne!(Id::digest("127.0.0.1:9000"), Id::digest("127.0.0.1:9001"));
    }

    #[test]
    fn pow2_sets_single_bit() {
        let p0 = Id::pow2(0);
        assert_eq!(p0.as_bytes()[BYTES - 1], 1);
        let p8 = Id::pow2(8);
        assert_eq!(p8.as_bytes()[BYTES - 2], 1);
        assert_eq!(p8.as_bytes()[BYTES - 1], 0);
    }

    #[test]
    fn wrapping_add_handles_carry() {
        let mut max = [0xffu8; BYTES];
        max[BYTES - 1] = 0xff;
        let id = Id::from_bytes(max);
        let one = Id::pow2(0);
        assert_eq!(id.wrapping_add(&one), Id::ZERO);
    }

    #[test]
    fn is_between_non_wrapping() {
        let a = Id::from_slice(&[10]);
        let b = Id::from_slice(&[20]);
        let k = Id::from_slice(&[15]);
        assert!(k.is_between(&a, &b));
        assert!(!a.is_between(&a, &b));
        assert!(b.is_between(&a, &b));
    }

    #[test]
    fn is_between_wrapping() {
        let a = Id::from_slice(&[200]);
        let b = Id::from_slice(&[20]);
        let k = Id::from_slice(&[250]);
        assert!(k.is_between(&a, &b));
        let k2 = Id::from_slice(&[10]);
        assert!(k2.is_between(&a, &b));
        let k3 = Id::from_slice(&[100]);
        assert!(!k3.is_between(&a, &b));
    }

    #[test]
    fn is_between_single_member_ring() {
        let a = Id::from_slice(&[42]);
        let other = Id::from_slice(&[7]);
        assert!(other.is_between(&a, &a));
        assert!(!a.is_between(&a, &a));
    }
}
