//! Error type for the canonicalization and signing surface.

use thiserror::Error;

/// Errors surfaced by canonicalization, signable-view construction, and
/// signature issuance/verification.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The value handed to `signable_view` was not a JSON object at the top level.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A public key or signature was the wrong length, or not valid base64.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// Neither the strict nor (if enabled) the compatibility verification
    /// path accepted the signature.
    #[error("signature invalid")]
    SignatureInvalid,

    /// The descriptor bytes were not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
