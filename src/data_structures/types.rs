//! Fixed-width primitive types shared across the draft pipeline

use std::fmt::{Display, Formatter};

use blake2::{Blake2b, Digest};
use borsh::{BorshDeserialize, BorshSerialize};
use digest::consts::U32;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{DraftError, DraftResult},
    hex_utils::{bytes_to_fixed, decode_fixed, serde_fixed},
};

pub const ADDRESS_LEN: usize = 20;
pub const HASH_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// A 20-byte ledger address
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub struct Address(#[serde(with = "serde_fixed")] [u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> DraftResult<Self> {
        Ok(Self(bytes_to_fixed("address", bytes)?))
    }

    pub fn from_hex(value: &str) -> DraftResult<Self> {
        Ok(Self(decode_fixed("address", value)?))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-byte identifier: transaction hashes, content hashes, state ids, sighashes
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub struct FixedHash(#[serde(with = "serde_fixed")] [u8; HASH_LEN]);

impl FixedHash {
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub fn from_slice(bytes: &[u8]) -> DraftResult<Self> {
        Ok(Self(bytes_to_fixed("hash", bytes)?))
    }

    pub fn from_hex(value: &str) -> DraftResult<Self> {
        Ok(Self(decode_fixed("hash", value)?))
    }

    /// Blake2b-256 digest of `data`
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(data);
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for FixedHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for FixedHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identifier of a fungible token class. Absence (`None`) denotes the native asset.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> DraftResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DraftError::invalid_argument(
                "token_id",
                id,
                "token id must not be empty; use None for the native asset",
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display helper for an optional token id
pub fn token_label(token_id: Option<&TokenId>) -> &str {
    token_id.map(TokenId::as_str).unwrap_or("native")
}

/// Compressed 32-byte public key of a signer
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct PublicKeyBytes(#[serde(with = "serde_fixed")] [u8; PUBLIC_KEY_LEN]);

impl PublicKeyBytes {
    pub const fn new(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// The address controlled by this key: the first 20 bytes of its Blake2b-256 digest
    pub fn to_address(&self) -> Address {
        let digest = FixedHash::digest(&self.0);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
        Address::new(bytes)
    }
}

/// Fixed-length 64-byte signature over a sighash
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct SignatureBytes(#[serde(with = "serde_fixed")] [u8; SIGNATURE_LEN]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}
