//! Error types for nsite-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// nsite-core error types
#[derive(Debug, Error)]
pub enum Error {
    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hex decoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// secp256k1 error (bad key, bad signature, etc.)
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    /// Event id does not match its canonical-form hash
    #[error("event id mismatch: computed {computed} != claimed {claimed}")]
    IdMismatch { computed: String, claimed: String },

    /// Schnorr signature failed verification
    #[error("invalid signature for pubkey {pubkey}")]
    InvalidSignature { pubkey: String },

    /// A hex field was the wrong length (pubkey, sha256, sig)
    #[error("invalid length for {field}: expected {expected} hex chars, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A required event field was missing or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A path could not be normalized (e.g. escapes the site root)
    #[error("invalid site path: {0}")]
    InvalidPath(String),
}
