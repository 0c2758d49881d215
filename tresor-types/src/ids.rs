//! Newtype identifiers used throughout the data model.

use uuid::Uuid;

use crate::wire::{self, WireDecode, WireEncode, WireError};

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random id.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl WireEncode for $name {
            fn encode(&self, out: &mut Vec<u8>) {
                self.0.encode(out);
            }
        }
        impl WireDecode for $name {
            fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
                Ok(Self(Uuid::decode(buf)?))
            }
        }
    };
}

uuid_id!(UserSetId, "Identifies a userset.");
uuid_id!(OperationId, "Identifies a decryption operation.");

/// Identifies a single party's Shamir shard within a userset layer.
///
/// Id `0` is reserved: it would evaluate a sharing polynomial at its own
/// secret rather than at a party's point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub u64);

impl WireEncode for ShardId {
    fn encode(&self, out: &mut Vec<u8>) {
        let be = self.0.to_be_bytes();
        let first_nonzero = be.iter().position(|b| *b != 0);
        let trimmed = match first_nonzero {
            Some(idx) => &be[idx..],
            None => &be[be.len()..],
        };
        wire::encode_bigint(trimmed, out).expect("shard id always fits in 65535 bytes");
    }
}
impl WireDecode for ShardId {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let bytes = wire::decode_bigint(buf)?;
        if bytes.len() > 8 {
            return Err(WireError::BigIntTooLarge);
        }
        let mut padded = [0u8; 8];
        padded[8 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self(u64::from_be_bytes(padded)))
    }
}
