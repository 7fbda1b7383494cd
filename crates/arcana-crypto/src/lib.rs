//! # Arcana Crypto
//!
//! Deterministic JSON canonicalization and Ed25519 signing for job
//! descriptors: the signing half of the job queue's trust boundary.
//! Canonicalization (sorted keys, recursive) guarantees the bytes a
//! producer signs are the exact bytes a verifier reproduces, independent
//! of map insertion order or which language built the JSON.

pub mod canonical;
pub mod error;
pub mod signable;
pub mod signer;

pub use canonical::canonicalize;
pub use error::CryptoError;
pub use signable::{signable_view, DEFAULT_CREDENTIAL_FIELDS, DEFAULT_SERVER_ASSIGNED_FIELDS};
pub use signer::{sign, verify, verify_raw, VerifyMode};
