//! Ed25519 sign/verify over canonical bytes, with a legacy compatibility
//! fallback for descriptors signed before `id`/`created_at` existed.

use crate::canonical::canonicalize_value;
use crate::error::CryptoError;
use crate::signable::{compat_view, strict_view, signable_view};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde_json::Value;
use tracing::warn;

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Which verification path accepted a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Credentials and server-assigned fields were both elided.
    Strict,
    /// Only credentials were elided; server-assigned fields were signed
    /// over. Accepted for backward compatibility with older producers.
    Compat,
}

/// Signs `descriptor`'s strict signable view, returning
/// `(signature_base64, public_key_base64)`.
pub fn sign(descriptor: &Value, signing_key: &SigningKey) -> Result<(String, String), CryptoError> {
    let view = strict_view(descriptor)?;
    let bytes = canonicalize_value(&view).into_bytes();
    let signature: Signature = signing_key.sign(&bytes);

    let signature_b64 = STANDARD.encode(signature.to_bytes());
    let public_key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());
    Ok((signature_b64, public_key_b64))
}

/// Verifies `descriptor` against `signature_b64`/`public_key_b64`.
///
/// Tries the strict signable view first; if that fails and
/// `allow_compat` is `true`, retries against the legacy compatibility
/// view (server-assigned fields retained) and logs a
/// `deprecated-canonicalization` event on success.
pub fn verify(
    descriptor: &Value,
    signature_b64: &str,
    public_key_b64: &str,
    allow_compat: bool,
) -> Result<VerifyMode, CryptoError> {
    let (verifying_key, signature) = decode_credentials(signature_b64, public_key_b64)?;

    let strict_bytes = canonicalize_value(&strict_view(descriptor)?).into_bytes();
    if verifying_key.verify(&strict_bytes, &signature).is_ok() {
        return Ok(VerifyMode::Strict);
    }

    if allow_compat {
        let compat_bytes = canonicalize_value(&compat_view(descriptor)?).into_bytes();
        if verifying_key.verify(&compat_bytes, &signature).is_ok() {
            warn!(
                event = "deprecated-canonicalization",
                "descriptor verified only under the legacy compatibility view"
            );
            return Ok(VerifyMode::Compat);
        }
    }

    Err(CryptoError::SignatureInvalid)
}

/// Verifies a producer's exact wire bytes, parsing them directly instead
/// of going through a typed struct. This preserves unknown fields a
/// server-side struct does not model (see the signing protocol's
/// unknown-field preservation requirement).
pub fn verify_raw(
    raw_json: &[u8],
    signature_b64: &str,
    public_key_b64: &str,
    strip: &[&str],
) -> Result<(), CryptoError> {
    let (verifying_key, signature) = decode_credentials(signature_b64, public_key_b64)?;

    let value: Value = serde_json::from_slice(raw_json)?;
    let view = signable_view(&value, strip)?;
    let bytes = canonicalize_value(&view).into_bytes();

    verifying_key
        .verify(&bytes, &signature)
        .map_err(|_| CryptoError::SignatureInvalid)
}

fn decode_credentials(
    signature_b64: &str,
    public_key_b64: &str,
) -> Result<(VerifyingKey, Signature), CryptoError> {
    let pk_bytes = STANDARD
        .decode(public_key_b64)
        .map_err(|e| CryptoError::MalformedCredential(format!("public key: {e}")))?;
    let sig_bytes = STANDARD
        .decode(signature_b64)
        .map_err(|e| CryptoError::MalformedCredential(format!("signature: {e}")))?;

    if pk_bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::MalformedCredential(format!(
            "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            pk_bytes.len()
        )));
    }
    if sig_bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::MalformedCredential(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            sig_bytes.len()
        )));
    }

    let mut pk_arr = [0u8; PUBLIC_KEY_LEN];
    pk_arr.copy_from_slice(&pk_bytes);
    let verifying_key = VerifyingKey::from_bytes(&pk_arr)
        .map_err(|e| CryptoError::MalformedCredential(format!("public key: {e}")))?;

    let mut sig_arr = [0u8; SIGNATURE_LEN];
    sig_arr.copy_from_slice(&sig_bytes);
    let signature = Signature::from_bytes(&sig_arr);

    Ok((verifying_key, signature))
}
