//! Idempotency key derivation
//!
//! The key is a SHA-256 digest over the RFC 8785 (JCS) canonical form of
//! `[args, kwargs]`, so equal arguments always produce the same key no
//! matter how the caller built the keyword map. It is a de-duplication
//! handle, not a commitment.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::task::Kwargs;

#[derive(Serialize)]
struct KeyInput<'a>(&'a [serde_json::Value], &'a Kwargs);

/// Hex digest identifying a set of call arguments
pub fn generate(args: &[serde_json::Value], kwargs: &Kwargs) -> Result<String, serde_json::Error> {
    let canonical = serde_jcs::to_vec(&KeyInput(args, kwargs))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Task name of the form `<label>-<key>`
pub fn task_name(
    label: &str,
    args: &[serde_json::Value],
    kwargs: &Kwargs,
) -> Result<String, serde_json::Error> {
    Ok(format!("{}-{}", label, generate(args, kwargs)?))
}
