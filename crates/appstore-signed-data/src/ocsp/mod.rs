//! OCSP revocation checks over HTTP (RFC 6960).
//!
//! A request carries a single SHA-1 `CertID` and is POSTed to the first OCSP
//! URL in the certificate's Authority Information Access extension. The
//! `BasicOCSPResponse` must be signed by the issuer itself or by a delegated
//! responder certificate that the issuer signed for OCSP signing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use der::asn1::{Any, OctetString};
use der::{Decode, Encode, Tag};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use sha1::{Digest, Sha1};
use tracing::debug;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::chain::ParsedCert;
use crate::error::ConfigError;
use crate::revocation::{RevocationChecker, RevocationError, RevocationStatus};
use crate::signature::verify_der_signature;

pub mod asn1;

pub use asn1::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    Request, ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse, TbsRequest,
    ID_ECDSA_WITH_SHA256, ID_ECDSA_WITH_SHA384, ID_PKIX_OCSP_BASIC, ID_SHA1,
};

const USER_AGENT_VALUE: &str = concat!("appstore-signed-data/", env!("CARGO_PKG_VERSION"));

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

impl From<der::Error> for RevocationError {
    fn from(e: der::Error) -> Self {
        RevocationError::invalid_response(format!("malformed OCSP DER: {e}"))
    }
}

impl CertId {
    /// SHA-1 `CertID` of `certificate` as issued by `issuer` (both DER).
    pub fn new(certificate: &[u8], issuer: &[u8]) -> Result<Self, RevocationError> {
        let cert = Certificate::from_der(certificate)?;
        let issuer = Certificate::from_der(issuer)?;

        let issuer_name = issuer.tbs_certificate.subject.to_der()?;
        let issuer_key = issuer
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes();

        Ok(Self {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: ID_SHA1,
                parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
            },
            issuer_name_hash: OctetString::new(Sha1::digest(&issuer_name).to_vec())?,
            issuer_key_hash: OctetString::new(Sha1::digest(issuer_key).to_vec())?,
            serial_number: cert.tbs_certificate.serial_number,
        })
    }

    /// Whether `other`, taken from a response, names the same certificate.
    ///
    /// Only SHA-1 identifiers can be compared; anything else is rejected.
    pub(crate) fn matches(&self, other: &CertId) -> Result<bool, RevocationError> {
        if other.hash_algorithm.oid != ID_SHA1 {
            return Err(RevocationError::invalid_response(format!(
                "unsupported CertID hash algorithm {}, expected SHA-1",
                other.hash_algorithm.oid
            )));
        }
        Ok(other.issuer_name_hash == self.issuer_name_hash
            && other.issuer_key_hash == self.issuer_key_hash
            && other.serial_number == self.serial_number)
    }
}

/// DER `OCSPRequest` for a single certificate, unsigned and without nonce.
pub fn encode_request(cert_id: &CertId) -> Result<Vec<u8>, RevocationError> {
    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Default::default(),
            request_list: vec![Request {
                req_cert: cert_id.clone(),
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
    };
    Ok(request.to_der()?)
}

/// [`RevocationChecker`] that queries the certificate's OCSP responder.
#[derive(Debug, Clone)]
pub struct HttpOcspChecker {
    client: reqwest::Client,
}

impl HttpOcspChecker {
    /// Create a checker whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(ACCEPT, HeaderValue::from_static(OCSP_RESPONSE_CONTENT_TYPE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ConfigError::Http {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Use an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str, request: Vec<u8>) -> Result<Vec<u8>, RevocationError> {
        debug!(url = %url, "sending OCSP request");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE)
            .body(request)
            .send()
            .await
            .map_err(|e| RevocationError::transport(format!("OCSP request to {url} failed: {e}")))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            429 | 500..=599 => {
                return Err(RevocationError::transport(format!(
                    "OCSP responder {url} returned HTTP {}",
                    status.as_u16()
                )))
            }
            _ => {
                return Err(RevocationError::invalid_response(format!(
                    "OCSP responder {url} returned HTTP {}",
                    status.as_u16()
                )))
            }
        }

        let body = response.bytes().await.map_err(|e| {
            RevocationError::transport(format!("reading OCSP response from {url} failed: {e}"))
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl RevocationChecker for HttpOcspChecker {
    async fn check(
        &self,
        certificate: &[u8],
        issuer: &[u8],
    ) -> Result<RevocationStatus, RevocationError> {
        let cert = ParsedCert::from_der(certificate).map_err(RevocationError::invalid_response)?;

        let Some(url) = cert.ocsp_urls.first() else {
            debug!(subject = %cert.subject_display, "no OCSP responder URL, treating as good");
            return Ok(RevocationStatus::Good);
        };

        let cert_id = CertId::new(certificate, issuer)?;
        let issuer = ParsedCert::from_der(issuer).map_err(RevocationError::invalid_response)?;
        let body = self.fetch(url, encode_request(&cert_id)?).await?;
        let status = parse_response(&body, &cert_id, &issuer, Utc::now().timestamp())?;

        debug!(subject = %cert.subject_display, status = %status, "OCSP status");
        Ok(status)
    }
}

/// Parse and authenticate an `OCSPResponse` for `cert_id`.
pub(crate) fn parse_response(
    body: &[u8],
    cert_id: &CertId,
    issuer: &ParsedCert,
    now: i64,
) -> Result<RevocationStatus, RevocationError> {
    let response = OcspResponse::from_der(body)?;
    match response.response_status {
        OcspResponseStatus::Successful => {}
        status @ (OcspResponseStatus::InternalError | OcspResponseStatus::TryLater) => {
            return Err(RevocationError::transport(format!(
                "OCSP responder returned status {status:?}"
            )))
        }
        other => {
            return Err(RevocationError::invalid_response(format!(
                "OCSP responder returned status {other:?}"
            )))
        }
    }

    let response_bytes = response.response_bytes.ok_or_else(|| {
        RevocationError::invalid_response("successful OCSP response without responseBytes")
    })?;
    if response_bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(RevocationError::invalid_response(
            "response type is not id-pkix-ocsp-basic",
        ));
    }
    let basic = BasicOcspResponse::from_der(response_bytes.response.as_bytes())?;

    let algorithm = basic.signature_algorithm.oid;
    if algorithm != ID_ECDSA_WITH_SHA256 && algorithm != ID_ECDSA_WITH_SHA384 {
        return Err(RevocationError::invalid_response(format!(
            "unsupported OCSP signature algorithm {algorithm}"
        )));
    }
    let signature = basic.signature.as_bytes().ok_or_else(|| {
        RevocationError::invalid_response("OCSP signature BIT STRING has unused bits")
    })?;

    let mut responder_certs = Vec::new();
    for cert in basic.certs.iter().flatten() {
        responder_certs
            .push(ParsedCert::from_der(&cert.to_der()?).map_err(RevocationError::invalid_response)?);
    }

    let tbs = basic.tbs_response_data.to_der()?;
    verify_response_signature(
        &tbs,
        &algorithm.to_string(),
        signature,
        issuer,
        &responder_certs,
        now,
    )?;

    for single in &basic.tbs_response_data.responses {
        if !cert_id.matches(&single.cert_id)? {
            continue;
        }

        if let Some(next_update) = &single.next_update {
            if unix_seconds(next_update) < now {
                return Err(RevocationError::invalid_response("OCSP response is stale"));
            }
        }

        return Ok(match single.cert_status {
            CertStatus::Good(_) => RevocationStatus::Good,
            CertStatus::Revoked(_) => RevocationStatus::Revoked,
            CertStatus::Unknown(_) => RevocationStatus::Unknown,
        });
    }

    Err(RevocationError::invalid_response(
        "OCSP response does not cover the certificate",
    ))
}

fn verify_response_signature(
    tbs: &[u8],
    algorithm: &str,
    signature: &[u8],
    issuer: &ParsedCert,
    responder_certs: &[ParsedCert],
    now: i64,
) -> Result<(), RevocationError> {
    if verify_der_signature(&issuer.spki, algorithm, tbs, signature).is_ok() {
        return Ok(());
    }

    for responder in responder_certs {
        if !responder.ocsp_signing || !responder.is_valid_at(now) {
            continue;
        }
        if responder.verify_issued_by(issuer).is_err() {
            continue;
        }
        if verify_der_signature(&responder.spki, algorithm, tbs, signature).is_ok() {
            debug!(responder = %responder.subject_display, "OCSP response signed by delegated responder");
            return Ok(());
        }
    }

    Err(RevocationError::invalid_response(
        "OCSP response is not signed by the issuer or an authorized responder",
    ))
}

fn unix_seconds(time: &der::asn1::GeneralizedTime) -> i64 {
    i64::try_from(time.to_unix_duration().as_secs()).unwrap_or(i64::MAX)
}
