//! BIP-340 Schnorr signing over secp256k1 (spec §3, §4.2)
//!
//! This is the local-key half of the signer abstraction's two variants
//! (`nsite_deploy::signer` owns the remote-bunker half and the trait that
//! unifies them); this module only provides the cryptographic primitive.

use crate::error::{Error, Result};
use secp256k1::{Keypair, Message, SecretKey, XOnlyPublicKey, SECP256K1};

/// A secp256k1 keypair used for BIP-340 Schnorr signing.
#[derive(Clone)]
pub struct KeyPair {
    keypair: Keypair,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);
        Self { keypair }
    }

    /// Load a keypair from a 32-byte hex-encoded secret key.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex)?;
        if bytes.len() != 32 {
            return Err(Error::InvalidLength {
                field: "secret_key",
                expected: 64,
                actual: secret_hex.len(),
            });
        }
        let secret_key = SecretKey::from_slice(&bytes)?;
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);
        Ok(Self { keypair })
    }

    /// The x-only public key, lowercase hex (what nostr calls `pubkey`).
    pub fn public_key_hex(&self) -> String {
        let (xonly, _parity) = self.keypair.x_only_public_key();
        hex::encode(xonly.serialize())
    }

    /// Sign a 32-byte message digest, returning a 64-byte Schnorr signature.
    pub fn sign(&self, digest: &[u8; 32]) -> [u8; 64] {
        let msg = Message::from_digest(*digest);
        let sig = SECP256K1.sign_schnorr(&msg, &self.keypair);
        let mut out = [0u8; 64];
        out.copy_from_slice(sig.as_ref());
        out
    }
}

/// Verify a BIP-340 Schnorr signature against a hex-encoded x-only pubkey.
pub fn verify(pubkey_hex: &str, digest: &[u8; 32], sig_hex: &str) -> Result<()> {
    let pubkey_bytes = hex::decode(pubkey_hex)?;
    if pubkey_bytes.len() != 32 {
        return Err(Error::InvalidLength {
            field: "pubkey",
            expected: 64,
            actual: pubkey_hex.len(),
        });
    }
    let xonly = XOnlyPublicKey::from_slice(&pubkey_bytes)?;

    let sig_bytes = hex::decode(sig_hex)?;
    if sig_bytes.len() != 64 {
        return Err(Error::InvalidLength {
            field: "signature",
            expected: 128,
            actual: sig_hex.len(),
        });
    }
    let sig = secp256k1::schnorr::Signature::from_slice(&sig_bytes)?;

    let msg = Message::from_digest(*digest);
    SECP256K1
        .verify_schnorr(&sig, &msg, &xonly)
        .map_err(|_| Error::InvalidSignature {
            pubkey: pubkey_hex.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let digest = [7u8; 32];
        let sig = kp.sign(&digest);

        let sig_hex = hex::encode(sig);
        assert!(verify(&kp.public_key_hex(), &digest, &sig_hex).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let kp = KeyPair::generate();
        let sig = kp.sign(&[1u8; 32]);
        let sig_hex = hex::encode(sig);

        assert!(verify(&kp.public_key_hex(), &[2u8; 32], &sig_hex).is_err());
    }

    #[test]
    fn from_hex_round_trips_public_key() {
        let seed = "0000000000000000000000000000000000000000000000000000000000000001";
        let trimmed = &seed[seed.len() - 64..];
        let a = KeyPair::from_hex(trimmed).unwrap();
        let b = KeyPair::from_hex(trimmed).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }
}
