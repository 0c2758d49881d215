//! Normative binary wire encoding.
//!
//! Every fixed-width integer is little-endian. Strings are UTF-8 followed by
//! a null terminator. `Scalar`/`Point` coordinates are length-prefixed
//! (`u16`, big-endian digits), zero length denoting the identity point.
//! Vectors are `u8`-count-prefixed: every vector this protocol defines
//! (member lists, userset lists, pending lookups, decryption parts) is
//! capped at 255 elements.

use std::convert::TryFrom;

use tresor_core::group::{GroupError, Point, Scalar};
use uuid::Uuid;

/// Errors decoding a wire-format buffer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Ran out of bytes before a value was fully decoded.
    #[error("unexpected end of buffer")]
    Eof,
    /// A string's bytes were not valid UTF-8.
    #[error("string was not valid utf-8")]
    InvalidUtf8,
    /// A string was not followed by a null terminator within the buffer.
    #[error("string was missing its null terminator")]
    UnterminatedString,
    /// A BigInt would need more than 65535 bytes to encode.
    #[error("BigInt exceeds the 65535 byte wire limit")]
    BigIntTooLarge,
    /// A vector has more than 255 elements.
    #[error("vector exceeds the 255 element wire limit")]
    VecTooLarge,
    /// A decoded `Scalar`/`Point` was malformed.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// An unrecognized packet code byte.
    #[error("unknown packet code {0}")]
    UnknownPacketCode(u8),
}

/// Implemented by every type with a normative wire encoding.
pub trait WireEncode {
    /// Appends this value's wire encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);
}

/// Implemented by every type with a normative wire decoding.
pub trait WireDecode: Sized {
    /// Consumes this value's encoding from the front of `buf`.
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError>;
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], WireError> {
    if buf.len() < n {
        return Err(WireError::Eof);
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

macro_rules! impl_uint {
    ($t:ty) => {
        impl WireEncode for $t {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
        impl WireDecode for $t {
            fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
                let bytes = take(buf, std::mem::size_of::<$t>())?;
                Ok(<$t>::from_le_bytes(bytes.try_into().expect("exact width")))
            }
        }
    };
}
impl_uint!(u8);
impl_uint!(u16);
impl_uint!(u32);
impl_uint!(u64);

impl WireEncode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        (*self as u8).encode(out);
    }
}
impl WireDecode for bool {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(u8::decode(buf)? != 0)
    }
}

impl WireEncode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
        out.push(0);
    }
}
impl WireDecode for String {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let pos = buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(WireError::UnterminatedString)?;
        let s = std::str::from_utf8(&buf[..pos])
            .map_err(|_| WireError::InvalidUtf8)?
            .to_owned();
        *buf = &buf[pos + 1..];
        Ok(s)
    }
}

impl WireEncode for Uuid {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}
impl WireDecode for Uuid {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let bytes = take(buf, 16)?;
        Ok(Uuid::from_slice(bytes).expect("exactly 16 bytes were taken"))
    }
}

/// Encodes `bytes` as a `u16`-length-prefixed big-endian BigInt.
pub fn encode_bigint(bytes: &[u8], out: &mut Vec<u8>) -> Result<(), WireError> {
    let len = u16::try_from(bytes.len()).map_err(|_| WireError::BigIntTooLarge)?;
    len.encode(out);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Decodes a `u16`-length-prefixed big-endian BigInt.
pub fn decode_bigint(buf: &mut &[u8]) -> Result<Vec<u8>, WireError> {
    let len = u16::decode(buf)? as usize;
    Ok(take(buf, len)?.to_vec())
}

impl WireEncode for Scalar {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bigint(&self.to_bytes(), out).expect("scalar always fits in 65535 bytes");
    }
}
impl WireDecode for Scalar {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let bytes = decode_bigint(buf)?;
        Ok(Scalar::from_bytes(&bytes)?)
    }
}

impl WireEncode for Point {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bigint(&self.x_bytes(), out).expect("coordinate always fits in 65535 bytes");
        if let Some(y) = self.y_bytes() {
            encode_bigint(&y, out).expect("coordinate always fits in 65535 bytes");
        }
    }
}
impl WireDecode for Point {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let x = decode_bigint(buf)?;
        if x.is_empty() {
            Ok(Point::from_coords(&x, None)?)
        } else {
            let y = decode_bigint(buf)?;
            Ok(Point::from_coords(&x, Some(&y))?)
        }
    }
}

impl WireEncode for tresor_core::elgamal::Ciphertext {
    fn encode(&self, out: &mut Vec<u8>) {
        self.c1.encode(out);
        self.c2.encode(out);
        (self.prefix.len() as u64).encode(out);
        (self.body.len() as u64).encode(out);
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&self.body);
    }
}
impl WireDecode for tresor_core::elgamal::Ciphertext {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let c1 = Point::decode(buf)?;
        let c2 = Point::decode(buf)?;
        let prefix_len = u64::decode(buf)? as usize;
        let body_len = u64::decode(buf)? as usize;
        let prefix = take(buf, prefix_len)?.to_vec();
        let body = take(buf, body_len)?.to_vec();
        Ok(Self {
            c1,
            c2,
            prefix,
            body,
        })
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_vec(self, out).expect("vector within the 255 element wire limit")
    }
}
impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        decode_vec(buf)
    }
}

/// Generates a plain-old-data struct along with mechanical [`WireEncode`]/
/// [`WireDecode`] impls that encode/decode each field in declaration order.
///
/// Every packet payload is declared once, here, instead of as a hand-written
/// encode method paired with a hand-written decode method that can drift
/// out of sync.
#[macro_export]
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::wire::WireEncode for $name {
            fn encode(&self, out: &mut Vec<u8>) {
                #[allow(unused_variables)]
                let Self { $($field),* } = self;
                $( $crate::wire::WireEncode::encode($field, out); )*
            }
        }

        impl $crate::wire::WireDecode for $name {
            fn decode(buf: &mut &[u8]) -> Result<Self, $crate::wire::WireError> {
                Ok(Self {
                    $( $field: $crate::wire::WireDecode::decode(buf)?, )*
                })
            }
        }
    };
}

/// Encodes a `u8`-count-prefixed vector.
pub fn encode_vec<T: WireEncode>(items: &[T], out: &mut Vec<u8>) -> Result<(), WireError> {
    let len = u8::try_from(items.len()).map_err(|_| WireError::VecTooLarge)?;
    len.encode(out);
    for item in items {
        item.encode(out);
    }
    Ok(())
}

/// Decodes a `u8`-count-prefixed vector.
pub fn decode_vec<T: WireDecode>(buf: &mut &[u8]) -> Result<Vec<T>, WireError> {
    let len = u8::decode(buf)? as usize;
    (0..len).map(|_| T::decode(buf)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uints_round_trip() {
        let mut out = Vec::new();
        1234u32.encode(&mut out);
        let mut buf = out.as_slice();
        assert_eq!(u32::decode(&mut buf).unwrap(), 1234);
        assert!(buf.is_empty());
    }

    #[test]
    fn strings_are_null_terminated() {
        let mut out = Vec::new();
        "alice".to_owned().encode(&mut out);
        assert_eq!(out, b"alice\0");
        let mut buf = out.as_slice();
        assert_eq!(String::decode(&mut buf).unwrap(), "alice");
    }

    #[test]
    fn scalar_and_point_round_trip() {
        let mut rng = rand::thread_rng();
        let s = Scalar::sample(&mut rng);
        let p = Point::from_scalar(&s);

        let mut out = Vec::new();
        s.encode(&mut out);
        p.encode(&mut out);
        let mut buf = out.as_slice();
        assert!(Scalar::decode(&mut buf).unwrap() == s);
        assert!(Point::decode(&mut buf).unwrap() == p);
    }

    #[test]
    fn identity_point_round_trips_with_empty_x() {
        let mut out = Vec::new();
        Point::identity().encode(&mut out);
        assert_eq!(out, vec![0u8, 0u8]); // u16 length prefix 0, no bytes, no y
        let mut buf = out.as_slice();
        assert!(Point::decode(&mut buf).unwrap().is_identity());
    }

    #[test]
    fn vec_round_trips_and_rejects_oversized() {
        let items = vec![1u8, 2, 3, 4];
        let mut out = Vec::new();
        encode_vec(&items, &mut out).unwrap();
        let mut buf = out.as_slice();
        let decoded: Vec<u8> = decode_vec(&mut buf).unwrap();
        assert_eq!(decoded, items);

        let too_many = vec![0u8; 256];
        let mut out = Vec::new();
        assert!(encode_vec(&too_many, &mut out).is_err());
    }
}
