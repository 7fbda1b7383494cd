//! Signable-view construction: the projection of a descriptor a signature
//! actually covers.

use crate::error::CryptoError;
use serde_json::Value;

/// Fields stripped from every signable view regardless of mode: the
/// signature itself and the public key that would verify it.
pub const DEFAULT_CREDENTIAL_FIELDS: &[&str] = &["signature", "public_key"];

/// Fields assigned by the server after a descriptor is signed; stripped
/// only in strict mode, since the producer signed before they existed.
pub const DEFAULT_SERVER_ASSIGNED_FIELDS: &[&str] = &["id", "created_at"];

/// Returns a deep copy of `value` with every field named in `strip`
/// removed (absent from the result, not merely null).
///
/// Fails with [`CryptoError::InvalidInput`] unless `value` is a JSON
/// object at the top level.
pub fn signable_view(value: &Value, strip: &[&str]) -> Result<Value, CryptoError> {
    let Value::Object(map) = value else {
        return Err(CryptoError::InvalidInput(
            "signable view requires a JSON object at the top level".to_string(),
        ));
    };

    let mut view = map.clone();
    for field in strip {
        view.remove(*field);
    }
    Ok(Value::Object(view))
}

/// Convenience: the strict signable view (credentials and server-assigned
/// fields both removed).
pub fn strict_view(value: &Value) -> Result<Value, CryptoError> {
    let strip: Vec<&str> = DEFAULT_CREDENTIAL_FIELDS
        .iter()
        .chain(DEFAULT_SERVER_ASSIGNED_FIELDS.iter())
        .copied()
        .collect();
    signable_view(value, &strip)
}

/// Convenience: the legacy-compatibility signable view (credentials
/// removed, server-assigned fields retained).
pub fn compat_view(value: &Value) -> Result<Value, CryptoError> {
    signable_view(value, DEFAULT_CREDENTIAL_FIELDS)
}
