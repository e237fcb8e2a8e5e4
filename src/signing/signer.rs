//! Local signing over sighashes
//!
//! Only `(hash) -> signature` crosses this boundary; private keys never leave
//! the signer and the raw draft is never signed.

use std::fmt;

use rand::rngs::OsRng;
use tari_crypto::{
    keys::{PublicKey, SecretKey},
    ristretto::{RistrettoPublicKey, RistrettoSchnorr, RistrettoSecretKey},
};
use tari_utilities::{hex::Hex, ByteArray};

use crate::{
    data_structures::{
        Address, FixedHash, PublicKeyBytes, SignatureBytes, PUBLIC_KEY_LEN, SIGNATURE_LEN,
    },
    errors::{DraftError, DraftResult},
};

/// Signs 32-byte sighashes with a key it never exposes
pub trait HashSigner: Send + Sync {
    /// Compressed public key reported alongside every signature
    fn public_key(&self) -> PublicKeyBytes;

    fn sign_hash(&self, hash: &FixedHash) -> DraftResult<SignatureBytes>;

    /// Address controlled by this signer
    fn address(&self) -> Address {
        self.public_key().to_address()
    }
}

/// Schnorr signer over the Ristretto group
pub struct RistrettoHashSigner {
    secret: RistrettoSecretKey,
    public: RistrettoPublicKey,
}

impl RistrettoHashSigner {
    pub fn new(secret: RistrettoSecretKey) -> Self {
        let public = RistrettoPublicKey::from_secret_key(&secret);
        Self { secret, public }
    }

    pub fn random() -> Self {
        Self::new(RistrettoSecretKey::random(&mut OsRng))
    }

    /// Load a signer from a hex-encoded 32-byte secret key
    pub fn from_secret_hex(secret_hex: &str) -> DraftResult<Self> {
        let secret = RistrettoSecretKey::from_hex(secret_hex).map_err(|e| {
            DraftError::invalid_argument("secret_key", "<redacted>", format!("{e:?}"))
        })?;
        Ok(Self::new(secret))
    }
}

impl fmt::Debug for RistrettoHashSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RistrettoHashSigner")
            .field("public", &self.public.to_hex())
            .finish_non_exhaustive()
    }
}

impl HashSigner for RistrettoHashSigner {
    fn public_key(&self) -> PublicKeyBytes {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(self.public.as_bytes());
        PublicKeyBytes::new(bytes)
    }

    fn sign_hash(&self, hash: &FixedHash) -> DraftResult<SignatureBytes> {
        let signature = RistrettoSchnorr::sign(&self.secret, hash.as_bytes(), &mut OsRng)
            .map_err(|e| DraftError::Signing(format!("{e:?}")))?;
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..32].copy_from_slice(signature.get_public_nonce().as_bytes());
        bytes[32..].copy_from_slice(signature.get_signature().as_bytes());
        Ok(SignatureBytes::new(bytes))
    }
}

/// Verify a signature produced by [`RistrettoHashSigner`]
pub fn verify_hash_signature(
    public_key: &PublicKeyBytes,
    hash: &FixedHash,
    signature: &SignatureBytes,
) -> bool {
    let parts = (
        RistrettoPublicKey::from_canonical_bytes(public_key.as_bytes()),
        RistrettoPublicKey::from_canonical_bytes(&signature.as_bytes()[..32]),
        RistrettoSecretKey::from_canonical_bytes(&signature.as_bytes()[32..]),
    );
    match parts {
        (Ok(public), Ok(nonce), Ok(s)) => {
            RistrettoSchnorr::new(nonce, s).verify(&public, hash.as_bytes())
        }
        _ => false,
    }
}
