//! ECDSA signature checks.
//!
//! Two shapes are verified here: the ES256 JWS signature (raw `r || s`)
//! over the token's signing input, and DER-encoded ECDSA signatures on
//! certificates and OCSP responses.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::signature::Verifier;
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256, Sha384};

use crate::chain::VerifiedKey;
use crate::error::{VerificationError, VerifyResult};

/// ecdsa-with-SHA256
pub const ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";

/// ecdsa-with-SHA384
pub const ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";

/// Verify an ES256 JWS signature against the chain's leaf key.
pub fn verify_es256(key: &VerifiedKey, signing_input: &[u8], signature: &[u8]) -> VerifyResult<()> {
    let sig = p256::ecdsa::Signature::from_slice(signature).map_err(|e| {
        VerificationError::signature_mismatch(format!(
            "signature is not a 64-byte P-256 r||s value: {e}"
        ))
    })?;

    key.verifying_key()
        .verify(signing_input, &sig)
        .map_err(|_| VerificationError::signature_mismatch("signature does not match payload"))
}

/// Verify a DER ECDSA signature made by the holder of `issuer_spki`.
///
/// The issuer key may be P-256 or P-384, independently of the digest named
/// by `algorithm_oid`.
pub(crate) fn verify_der_signature(
    issuer_spki: &[u8],
    algorithm_oid: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<(), String> {
    let digest = match algorithm_oid {
        ECDSA_WITH_SHA256 => Sha256::digest(message).to_vec(),
        ECDSA_WITH_SHA384 => Sha384::digest(message).to_vec(),
        other => return Err(format!("unsupported signature algorithm OID: {other}")),
    };

    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(issuer_spki) {
        let sig = p256::ecdsa::Signature::from_der(signature)
            .map_err(|e| format!("bad ECDSA signature bytes: {e}"))?;
        return vk
            .verify_prehash(&digest, &sig)
            .map_err(|_| "signature verification failed".to_string());
    }

    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(issuer_spki) {
        let sig = p384::ecdsa::Signature::from_der(signature)
            .map_err(|e| format!("bad ECDSA signature bytes: {e}"))?;
        return vk
            .verify_prehash(&digest, &sig)
            .map_err(|_| "signature verification failed".to_string());
    }

    Err("issuer key is not an ECDSA P-256 or P-384 key".to_string())
}
