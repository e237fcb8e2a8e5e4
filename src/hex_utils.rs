//! Hex helpers for binary fields crossing the ledger boundary
//!
//! All binary fields are serialized as lowercase hex strings so one deployment
//! stays consistent regardless of transport.

use crate::errors::{DraftError, DraftResult, SerializationError};

/// Decode a hex string into a fixed-size array, failing on any length mismatch
pub fn decode_fixed<const N: usize>(argument: &str, value: &str) -> DraftResult<[u8; N]> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(trimmed).map_err(SerializationError::from)?;
    bytes_to_fixed(argument, &bytes)
}

/// Convert a slice into a fixed-size array, failing on any length mismatch
pub fn bytes_to_fixed<const N: usize>(argument: &str, bytes: &[u8]) -> DraftResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        DraftError::invalid_argument(
            argument,
            hex::encode(bytes),
            format!("expected {N} bytes, got {}", bytes.len()),
        )
    })
}

/// Serde adapter for `[u8; N]` as a hex string
pub mod serde_fixed {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        <[u8; N]>::try_from(bytes.as_slice())
            .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {}", bytes.len())))
    }
}

/// Serde adapter for `Vec<u8>` as a hex string
pub mod serde_bytes_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_accepts_prefixed_hex() {
        let bytes: [u8; 4] = decode_fixed("value", "0xdeadbeef").unwrap();
        assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_fixed_rejects_wrong_length() {
        let err = decode_fixed::<20>("owner", "deadbeef").unwrap_err();
        match err {
            DraftError::InvalidArgument {
                argument, message, ..
            } => {
                assert_eq!(argument, "owner");
                assert!(message.contains("expected 20 bytes"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_fixed_rejects_bad_hex() {
        assert!(matches!(
            decode_fixed::<2>("x", "zz00"),
            Err(DraftError::Serialization(
                SerializationError::HexDecodingError(_)
            ))
        ));
    }
}
