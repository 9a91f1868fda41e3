//! Compact JWS envelope decoding.
//!
//! A token is `base64url(header) "." base64url(payload) "." base64url(signature)`.
//! The header must name `ES256` and carry the signing chain in `x5c`
//! (base64-standard DER, leaf first).

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use crate::error::{VerificationError, VerifyResult};

/// The only signing algorithm the App Store uses.
pub const EXPECTED_ALGORITHM: &str = "ES256";

/// base64url that accepts segments with or without padding.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Protected header of an App Store JWS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwsHeader {
    /// Signing algorithm.
    #[serde(rename = "alg")]
    pub algorithm: String,

    /// DER certificates, leaf first.
    #[serde(rename = "x5c", deserialize_with = "deserialize_x5c")]
    pub certificate_chain: Vec<Vec<u8>>,
}

fn deserialize_x5c<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let encoded = Vec::<String>::deserialize(deserializer)?;
    encoded
        .iter()
        .enumerate()
        .map(|(i, cert)| {
            STANDARD
                .decode(cert)
                .map_err(|e| serde::de::Error::custom(format!("x5c[{i}]: {e}")))
        })
        .collect()
}

/// A decoded JWS whose signature has not been checked yet.
#[derive(Debug, Clone)]
pub struct SignedEnvelope<'a> {
    pub header: JwsHeader,

    /// Decoded payload bytes (JSON).
    pub payload: Vec<u8>,

    /// Exact `header "." payload` text from the token.
    pub signing_input: &'a str,

    signature: &'a str,
}

impl<'a> SignedEnvelope<'a> {
    /// Decode the header and payload of `token`.
    pub fn decode(token: &'a str) -> VerifyResult<Self> {
        let [header_b64, payload_b64, signature] = split_token(token)?;

        let header_bytes = decode_segment(header_b64, "header")?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VerificationError::malformed(format!("invalid JWS header: {e}")))?;

        if header.algorithm != EXPECTED_ALGORITHM {
            return Err(VerificationError::signature_mismatch(format!(
                "unsupported algorithm '{}', expected {EXPECTED_ALGORITHM}",
                header.algorithm
            )));
        }

        let payload = decode_segment(payload_b64, "payload")?;

        // Segments are ASCII, so this offset lands on a char boundary.
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];

        debug!(
            chain_len = header.certificate_chain.len(),
            payload_len = payload.len(),
            "decoded JWS envelope"
        );

        Ok(Self {
            header,
            payload,
            signing_input,
            signature,
        })
    }

    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.header.certificate_chain
    }

    /// Raw `r || s` signature bytes.
    ///
    /// An undecodable signature can never verify, so it is reported as a
    /// signature failure rather than a malformed envelope.
    pub fn signature(&self) -> VerifyResult<Vec<u8>> {
        BASE64_URL.decode(self.signature).map_err(|e| {
            VerificationError::signature_mismatch(format!("undecodable signature: {e}"))
        })
    }
}

/// Split a compact JWS into exactly three segments.
pub fn split_token(token: &str) -> VerifyResult<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        _ => Err(VerificationError::malformed(format!(
            "expected 3 segments, found {}",
            token.split('.').count()
        ))),
    }
}

/// Decode only the payload segment, without looking at header or signature.
pub fn decode_payload_unverified(token: &str) -> VerifyResult<Vec<u8>> {
    let [_, payload_b64, _] = split_token(token)?;
    decode_segment(payload_b64, "payload")
}

/// Claimed signing time of a payload, in milliseconds since the epoch.
///
/// Reads `signedDate`, falling back to `receiptCreationDate` (app
/// transactions). The value is unauthenticated until the signature has been
/// verified.
pub fn claimed_signed_date(payload: &[u8]) -> VerifyResult<Option<i64>> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| VerificationError::malformed(format!("payload is not JSON: {e}")))?;
    Ok(["signedDate", "receiptCreationDate"]
        .iter()
        .find_map(|field| value.get(field).and_then(serde_json::Value::as_i64)))
}

fn decode_segment(segment: &str, name: &str) -> VerifyResult<Vec<u8>> {
    BASE64_URL
        .decode(segment)
        .map_err(|e| VerificationError::malformed(format!("invalid base64url in {name}: {e}")))
}
