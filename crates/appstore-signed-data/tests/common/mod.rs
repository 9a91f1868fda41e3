//! Shared fixtures: a generated App Store-like PKI, token signing, and an
//! OCSP responder for wiremock.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use appstore_signed_data::ocsp::{
    self, BasicOcspResponse, CertId, OcspRequest, OcspResponse, OcspResponseStatus, ResponderId,
    ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
};
use appstore_signed_data::{RevocationChecker, RevocationError, RevocationStatus};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use der::asn1::{BitString, GeneralizedTime, Ia5String, Null, ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use p256::ecdsa::signature::Signer;
use p256::pkcs8::DecodePrivateKey;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use wiremock::{Request, Respond, ResponseTemplate};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax};
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

pub const BUNDLE_ID: &str = "com.example";
pub const APP_APPLE_ID: i64 = 1234;

pub const LEAF_MARKER: &[u64] = &[1, 2, 840, 113635, 100, 6, 11, 1];
pub const INTERMEDIATE_MARKER: &[u64] = &[1, 2, 840, 113635, 100, 6, 2, 1];
const AUTHORITY_INFO_ACCESS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];

const ID_AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

/// Validity window as `(year, month, day)` pairs.
pub type Validity = ((i32, u8, u8), (i32, u8, u8));

const DEFAULT_VALIDITY: Validity = ((2020, 1, 1), (2045, 1, 1));

/// Options for generating a leaf/intermediate/root chain.
#[derive(Clone)]
pub struct PkiBuilder {
    pub root_name: String,
    pub leaf_marker: bool,
    pub intermediate_marker: bool,
    pub leaf_validity: Validity,
    pub leaf_ocsp_url: Option<String>,
    pub intermediate_ocsp_url: Option<String>,
    pub root_path_len: Option<u8>,
}

impl Default for PkiBuilder {
    fn default() -> Self {
        Self {
            root_name: "Test Root CA - G3".to_string(),
            leaf_marker: true,
            intermediate_marker: true,
            leaf_validity: DEFAULT_VALIDITY,
            leaf_ocsp_url: None,
            intermediate_ocsp_url: None,
            root_path_len: None,
        }
    }
}

/// A generated chain and the private keys (PKCS#8) behind it.
pub struct Pki {
    pub root: Vec<u8>,
    pub root_key: Vec<u8>,
    pub intermediate: Vec<u8>,
    pub intermediate_key: Vec<u8>,
    pub leaf: Vec<u8>,
    pub leaf_key: Vec<u8>,
    root_issuer: (rcgen::Certificate, KeyPair),
    intermediate_issuer: (rcgen::Certificate, KeyPair),
}

fn validity(params: &mut CertificateParams, ((y1, m1, d1), (y2, m2, d2)): Validity) {
    params.not_before = rcgen::date_time_ymd(y1, m1, d1);
    params.not_after = rcgen::date_time_ymd(y2, m2, d2);
}

fn params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    validity(&mut params, DEFAULT_VALIDITY);
    params
}

fn aia_extension(url: &str) -> CustomExtension {
    let access = AuthorityInfoAccessSyntax(vec![AccessDescription {
        access_method: ID_AD_OCSP,
        access_location: GeneralName::UniformResourceIdentifier(Ia5String::new(url).unwrap()),
    }]);
    CustomExtension::from_oid_content(AUTHORITY_INFO_ACCESS, access.to_der().unwrap())
}

fn marker(oid: &[u64]) -> CustomExtension {
    CustomExtension::from_oid_content(oid, vec![0x05, 0x00])
}

impl PkiBuilder {
    pub fn build(&self) -> Pki {
        let root_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let mut root_params = params(&self.root_name);
        root_params.is_ca = IsCa::Ca(match self.root_path_len {
            Some(n) => BasicConstraints::Constrained(n),
            None => BasicConstraints::Unconstrained,
        });
        let root = root_params.self_signed(&root_key).unwrap();

        let intermediate_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let mut intermediate_params = params("Test Worldwide Developer Relations CA - G6");
        intermediate_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        if self.intermediate_marker {
            intermediate_params
                .custom_extensions
                .push(marker(INTERMEDIATE_MARKER));
        }
        if let Some(url) = &self.intermediate_ocsp_url {
            intermediate_params.custom_extensions.push(aia_extension(url));
        }
        let intermediate = intermediate_params
            .signed_by(&intermediate_key, &root, &root_key)
            .unwrap();

        let leaf_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let mut leaf_params = params("Prod ECC Mac App Store and iTunes Store Receipt Signing");
        validity(&mut leaf_params, self.leaf_validity);
        if self.leaf_marker {
            leaf_params.custom_extensions.push(marker(LEAF_MARKER));
        }
        if let Some(url) = &self.leaf_ocsp_url {
            leaf_params.custom_extensions.push(aia_extension(url));
        }
        let leaf = leaf_params
            .signed_by(&leaf_key, &intermediate, &intermediate_key)
            .unwrap();

        Pki {
            root: root.der().to_vec(),
            root_key: root_key.serialize_der(),
            intermediate: intermediate.der().to_vec(),
            intermediate_key: intermediate_key.serialize_der(),
            leaf: leaf.der().to_vec(),
            leaf_key: leaf_key.serialize_der(),
            root_issuer: (root, root_key),
            intermediate_issuer: (intermediate, intermediate_key),
        }
    }
}

impl Pki {
    pub fn generate() -> Self {
        PkiBuilder::default().build()
    }

    pub fn chain(&self) -> Vec<Vec<u8>> {
        vec![
            self.leaf.clone(),
            self.intermediate.clone(),
            self.root.clone(),
        ]
    }

    /// Delegated responder for the leaf's status, issued by the intermediate.
    /// Returns the responder certificate and its PKCS#8 key.
    pub fn leaf_responder(&self, ocsp_signing: bool) -> (Vec<u8>, Vec<u8>) {
        let (issuer, issuer_key) = &self.intermediate_issuer;
        responder_certificate(issuer, issuer_key, ocsp_signing)
    }

    /// Delegated responder for the intermediate's status, issued by the root.
    pub fn intermediate_responder(&self, ocsp_signing: bool) -> (Vec<u8>, Vec<u8>) {
        let (issuer, issuer_key) = &self.root_issuer;
        responder_certificate(issuer, issuer_key, ocsp_signing)
    }

    /// Sign `payload` with the leaf key, embedding this chain.
    pub fn sign(&self, payload: &serde_json::Value) -> String {
        sign_with_chain(&self.leaf_key, &self.chain(), payload)
    }
}

/// Sign `payload` with `leaf_key` (PKCS#8), embedding `chain` as `x5c`.
pub fn sign_with_chain(leaf_key: &[u8], chain: &[Vec<u8>], payload: &serde_json::Value) -> String {
    let x5c: Vec<String> = chain.iter().map(|der| STANDARD.encode(der)).collect();
    let header = serde_json::json!({"alg": "ES256", "x5c": x5c});
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );

    let key = p256::ecdsa::SigningKey::from_pkcs8_der(leaf_key).unwrap();
    let signature: p256::ecdsa::Signature = key.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

/// Milliseconds since the epoch for a UTC date.
pub fn millis(year: i32, month: u32, day: u32) -> i64 {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

/// `certStatus` a fake responder reports.
#[derive(Debug, Clone, Copy)]
pub enum CertStatus {
    Good,
    Revoked,
    Unknown,
}

/// wiremock responder that answers OCSP requests, echoing the request's
/// `CertID` unless overridden.
pub struct OcspResponder {
    pub status: CertStatus,
    /// PKCS#8 key that signs the response.
    pub signer_key: Vec<u8>,
    /// Certificates included in the response (delegated responder).
    pub certs: Vec<Vec<u8>>,
    pub cert_id_override: Option<CertId>,
    /// `nextUpdate` in seconds since the epoch.
    pub next_update: Option<i64>,
}

impl OcspResponder {
    pub fn new(status: CertStatus, signer_key: &[u8]) -> Self {
        Self {
            status,
            signer_key: signer_key.to_vec(),
            certs: Vec::new(),
            cert_id_override: None,
            next_update: None,
        }
    }
}

impl Respond for OcspResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let cert_id = match &self.cert_id_override {
            Some(id) => id.clone(),
            None => request_cert_id(&request.body),
        };
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/ocsp-response")
            .set_body_bytes(ocsp_response(
                cert_id,
                self.status,
                &self.signer_key,
                &self.certs,
                self.next_update,
            ))
    }
}

/// `CertID` of a single-request `OCSPRequest`.
pub fn request_cert_id(body: &[u8]) -> CertId {
    let request = OcspRequest::from_der(body).unwrap();
    request.tbs_request.request_list[0].req_cert.clone()
}

fn generalized_time(seconds: i64) -> GeneralizedTime {
    GeneralizedTime::from_unix_duration(Duration::from_secs(seconds as u64)).unwrap()
}

/// Sign `message` with a P-256 or P-384 PKCS#8 key, returning the
/// signature algorithm and the DER signature.
fn sign_der(pkcs8: &[u8], message: &[u8]) -> (ObjectIdentifier, Vec<u8>) {
    if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(pkcs8) {
        let sig: p256::ecdsa::Signature = key.sign(message);
        return (ocsp::ID_ECDSA_WITH_SHA256, sig.to_der().as_bytes().to_vec());
    }
    let key = p384::ecdsa::SigningKey::from_pkcs8_der(pkcs8).unwrap();
    let sig: p384::ecdsa::Signature = key.sign(message);
    (ocsp::ID_ECDSA_WITH_SHA384, sig.to_der().as_bytes().to_vec())
}

/// DER `OCSPResponse` with one `SingleResponse`.
pub fn ocsp_response(
    cert_id: CertId,
    status: CertStatus,
    signer_key: &[u8],
    certs: &[Vec<u8>],
    next_update: Option<i64>,
) -> Vec<u8> {
    let issued_at = generalized_time(millis(2024, 1, 1) / 1000);
    let cert_status = match status {
        CertStatus::Good => ocsp::CertStatus::Good(Null),
        CertStatus::Revoked => ocsp::CertStatus::Revoked(RevokedInfo {
            revocation_time: issued_at,
            revocation_reason: None,
        }),
        CertStatus::Unknown => ocsp::CertStatus::Unknown(Null),
    };

    let tbs_response_data = ResponseData {
        version: Default::default(),
        responder_id: ResponderId::ByKey(OctetString::new(vec![0u8; 20]).unwrap()),
        produced_at: issued_at,
        responses: vec![SingleResponse {
            cert_id,
            cert_status,
            this_update: issued_at,
            next_update: next_update.map(generalized_time),
            single_extensions: None,
        }],
        response_extensions: None,
    };

    let (algorithm, signature) = sign_der(signer_key, &tbs_response_data.to_der().unwrap());
    let certs = if certs.is_empty() {
        None
    } else {
        Some(
            certs
                .iter()
                .map(|der| Certificate::from_der(der).unwrap())
                .collect(),
        )
    };

    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: algorithm,
            parameters: None,
        },
        signature: BitString::from_bytes(&signature).unwrap(),
        certs,
    };

    OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ocsp::ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der().unwrap()).unwrap(),
        }),
    }
    .to_der()
    .unwrap()
}

fn responder_certificate(
    issuer: &rcgen::Certificate,
    issuer_key: &KeyPair,
    ocsp_signing: bool,
) -> (Vec<u8>, Vec<u8>) {
    let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    let mut responder = params("Test OCSP Responder");
    if ocsp_signing {
        responder.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
    }
    let cert = responder.signed_by(&key, issuer, issuer_key).unwrap();
    (cert.der().to_vec(), key.serialize_der())
}

/// Revocation checker that records calls and returns a fixed outcome.
pub struct CountingChecker {
    pub calls: AtomicUsize,
    pub outcome: Result<RevocationStatus, RevocationError>,
    pub delay: Option<Duration>,
}

impl CountingChecker {
    pub fn new(outcome: Result<RevocationStatus, RevocationError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome,
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(RevocationStatus::Good),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevocationChecker for CountingChecker {
    async fn check(
        &self,
        _certificate: &[u8],
        _issuer: &[u8],
    ) -> Result<RevocationStatus, RevocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
