//! The default job handler: verifies a descriptor's signature before
//! handing it off. What actually executes a benchmark is outside this
//! service's scope; this handler is the seam where that dispatch would
//! plug in.

use std::sync::Arc;

use arcana_config::SigningConfig;
use arcana_jobs::JobHandler;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::VerifyingKey;
use tracing::{info, warn};

/// Builds a [`JobHandler`] that verifies the descriptor carried in a
/// message's payload, when a public key is configured. With no public
/// key configured, messages are accepted unverified (useful for queues
/// that carry jobs with no signing requirement).
///
/// The configured key is decoded once up front, so a malformed
/// `public_key_b64` is caught at startup instead of on the first
/// message.
pub fn verifying_handler(signing: SigningConfig) -> JobHandler {
    if signing.public_key_b64.is_some() && configured_verifying_key(&signing).is_none() {
        warn!("configured public key does not decode to a valid Ed25519 key, all signature checks will fail");
    }

    Arc::new(move |message| {
        let signing = signing.clone();
        Box::pin(async move {
            let Some(public_key_b64) = signing.public_key_b64.as_ref() else {
                info!(job.id = %message.id, "no public key configured, skipping signature check");
                return Ok(());
            };

            let signature_b64 = message
                .payload
                .get("signature")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "payload missing signature field".to_string())?;

            match arcana_crypto::verify(&message.payload, signature_b64, public_key_b64, signing.verify_compatibility_mode) {
                Ok(mode) => {
                    info!(job.id = %message.id, mode = ?mode, "descriptor verified");
                    Ok(())
                }
                Err(e) => {
                    warn!(job.id = %message.id, error = %e, "descriptor verification failed");
                    Err(e.to_string())
                }
            }
        })
    })
}

/// Decodes the base64 public key configured for this service, if any.
pub fn configured_verifying_key(signing: &SigningConfig) -> Option<VerifyingKey> {
    let raw = signing.public_key_b64.as_ref()?;
    let bytes = STANDARD.decode(raw).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}
