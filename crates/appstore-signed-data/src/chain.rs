//! Certificate chain validation.
//!
//! An App Store JWS carries exactly three certificates: leaf, intermediate
//! and root. The chain is accepted when:
//!
//! - the leaf is signed by the intermediate and the intermediate by a pinned
//!   trust root, which the chain's third certificate must equal by subject
//!   and public key;
//! - every certificate is valid at the effective time;
//! - CA certificates carry `basicConstraints CA=true` with a path length
//!   that allows this depth;
//! - the leaf and intermediate carry the App Store marker extensions;
//! - with online checks, neither the leaf nor the intermediate is revoked.
//!
//! A successful validation is cached by chain fingerprint, so repeated
//! tokens from the same chain skip all of the above.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use p256::pkcs8::DecodePublicKey;
use tracing::{debug, warn};
use x509_parser::extensions::{GeneralName, ParsedExtension};

use crate::cache::{CertificateCache, ChainFingerprint};
use crate::error::{ConfigError, VerificationError, VerifyResult};
use crate::revocation::{RevocationChecker, RevocationError, RevocationStatus};
use crate::signature::verify_der_signature;

/// leaf, intermediate, root
pub const EXPECTED_CHAIN_LENGTH: usize = 3;

/// Marker extension on App Store receipt-signing leaf certificates.
pub const LEAF_MARKER_OID: &str = "1.2.840.113635.100.6.11.1";

/// Marker extension on the Apple WWDR intermediate.
pub const INTERMEDIATE_MARKER_OID: &str = "1.2.840.113635.100.6.2.1";

const OCSP_ACCESS_METHOD_OID: &str = "1.3.6.1.5.5.7.48.1";

/// Leaf public key recovered from a fully validated chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedKey {
    key: p256::ecdsa::VerifyingKey,
    spki_der: Vec<u8>,
}

impl VerifiedKey {
    pub(crate) fn from_spki(spki_der: &[u8]) -> Result<Self, String> {
        let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
            .map_err(|e| format!("leaf key is not a P-256 public key: {e}"))?;
        Ok(Self {
            key,
            spki_der: spki_der.to_vec(),
        })
    }

    pub fn verifying_key(&self) -> &p256::ecdsa::VerifyingKey {
        &self.key
    }

    /// DER SubjectPublicKeyInfo of the leaf.
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }
}

/// Owned view of the certificate fields the verifier needs.
#[derive(Debug, Clone)]
pub(crate) struct ParsedCert {
    pub der: Vec<u8>,
    pub subject: Vec<u8>,
    pub subject_display: String,
    pub issuer: Vec<u8>,
    pub spki: Vec<u8>,
    pub tbs: Vec<u8>,
    pub signature_oid: String,
    pub signature: Vec<u8>,
    pub not_before: i64,
    pub not_after: i64,
    /// `(ca, path_len_constraint)` when basicConstraints is present.
    pub basic_constraints: Option<(bool, Option<u32>)>,
    pub extension_oids: Vec<String>,
    pub ocsp_urls: Vec<String>,
    pub ocsp_signing: bool,
}

impl ParsedCert {
    pub fn from_der(der: &[u8]) -> Result<Self, String> {
        let (rest, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| format!("invalid certificate DER: {e}"))?;
        if !rest.is_empty() {
            return Err(format!("{} trailing bytes after certificate", rest.len()));
        }

        let basic_constraints = cert
            .basic_constraints()
            .map_err(|e| format!("invalid basicConstraints: {e}"))?
            .map(|ext| (ext.value.ca, ext.value.path_len_constraint));

        let ocsp_signing = cert
            .extended_key_usage()
            .map_err(|e| format!("invalid extendedKeyUsage: {e}"))?
            .map(|ext| ext.value.ocsp_signing)
            .unwrap_or(false);

        let mut ocsp_urls = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_id_string() != OCSP_ACCESS_METHOD_OID {
                        continue;
                    }
                    if let GeneralName::URI(uri) = &desc.access_location {
                        ocsp_urls.push((*uri).to_string());
                    }
                }
            }
        }

        let tbs = &cert.tbs_certificate;
        Ok(Self {
            der: der.to_vec(),
            subject: tbs.subject.as_raw().to_vec(),
            subject_display: tbs.subject.to_string(),
            issuer: tbs.issuer.as_raw().to_vec(),
            spki: tbs.subject_pki.raw.to_vec(),
            tbs: tbs.as_ref().to_vec(),
            signature_oid: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            basic_constraints,
            extension_oids: cert
                .extensions()
                .iter()
                .map(|ext| ext.oid.to_id_string())
                .collect(),
            ocsp_urls,
            ocsp_signing,
        })
    }

    pub fn has_extension(&self, oid: &str) -> bool {
        self.extension_oids.iter().any(|o| o == oid)
    }

    pub fn is_valid_at(&self, unix_secs: i64) -> bool {
        self.not_before <= unix_secs && unix_secs <= self.not_after
    }

    /// Whether `self` names `issuer` as issuer and carries its signature.
    pub fn verify_issued_by(&self, issuer: &ParsedCert) -> Result<(), String> {
        if self.issuer != issuer.subject {
            return Err(format!(
                "issuer of '{}' does not match subject of '{}'",
                self.subject_display, issuer.subject_display
            ));
        }
        verify_der_signature(&issuer.spki, &self.signature_oid, &self.tbs, &self.signature)
            .map_err(|e| format!("signature on '{}': {e}", self.subject_display))
    }

    /// Check that this CA may sign a path with `below` further CA
    /// certificates under it.
    fn check_ca(&self, below: u32) -> Result<(), String> {
        match self.basic_constraints {
            Some((true, None)) => Ok(()),
            Some((true, Some(max))) if below <= max => Ok(()),
            Some((true, Some(max))) => Err(format!(
                "'{}' path length {max} does not allow {below} intermediate(s)",
                self.subject_display
            )),
            _ => Err(format!(
                "'{}' is not a CA certificate",
                self.subject_display
            )),
        }
    }
}

/// Pinned root certificates, parsed once.
#[derive(Debug, Clone)]
pub struct TrustRoots {
    roots: Arc<Vec<ParsedCert>>,
}

impl TrustRoots {
    /// Parse DER root certificates. Fails on an empty set or unparseable entry.
    pub fn from_der<I, C>(roots: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let parsed = roots
            .into_iter()
            .enumerate()
            .map(|(index, der)| {
                ParsedCert::from_der(der.as_ref())
                    .map_err(|message| ConfigError::InvalidTrustRoot { index, message })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if parsed.is_empty() {
            return Err(ConfigError::EmptyTrustRoots);
        }

        Ok(Self {
            roots: Arc::new(parsed),
        })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &ParsedCert> {
        self.roots.iter()
    }
}

/// Validates `x5c` chains against pinned roots and caches the result.
#[derive(Clone)]
pub struct ChainVerifier {
    roots: TrustRoots,
    cache: CertificateCache,
    revocation: Arc<dyn RevocationChecker>,
    ocsp_timeout: Duration,
}

impl std::fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("roots", &self.roots.len())
            .field("cached", &self.cache.len())
            .field("ocsp_timeout", &self.ocsp_timeout)
            .finish_non_exhaustive()
    }
}

impl ChainVerifier {
    pub fn new(
        roots: TrustRoots,
        cache: CertificateCache,
        revocation: Arc<dyn RevocationChecker>,
        ocsp_timeout: Duration,
    ) -> Self {
        Self {
            roots,
            cache,
            revocation,
            ocsp_timeout,
        }
    }

    pub fn cache(&self) -> &CertificateCache {
        &self.cache
    }

    /// Validate `chain` at `effective_time` and return the leaf key.
    pub async fn verify(
        &self,
        chain: &[Vec<u8>],
        online_checks: bool,
        effective_time: DateTime<Utc>,
    ) -> VerifyResult<VerifiedKey> {
        if chain.len() != EXPECTED_CHAIN_LENGTH {
            return Err(VerificationError::InvalidChainLength {
                expected: EXPECTED_CHAIN_LENGTH,
                actual: chain.len(),
            });
        }

        let leaf = parse(&chain[0], "leaf")?;
        let intermediate = parse(&chain[1], "intermediate")?;
        let root = parse(&chain[2], "root")?;

        if !leaf.has_extension(LEAF_MARKER_OID) {
            return Err(VerificationError::invalid_certificate(format!(
                "leaf certificate lacks marker extension {LEAF_MARKER_OID}"
            )));
        }
        if !intermediate.has_extension(INTERMEDIATE_MARKER_OID) {
            return Err(VerificationError::invalid_certificate(format!(
                "intermediate certificate lacks marker extension {INTERMEDIATE_MARKER_OID}"
            )));
        }
        let key = VerifiedKey::from_spki(&leaf.spki).map_err(VerificationError::invalid_certificate)?;

        let fingerprint = ChainFingerprint::of(chain);
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "certificate chain cache hit");
            return Ok(cached);
        }
        debug!(fingerprint = %fingerprint, "certificate chain cache miss");

        let anchor = self.validate_path(&leaf, &intermediate, &root, effective_time.timestamp())?;

        if online_checks {
            self.check_revocation(&leaf, &intermediate).await?;
            self.check_revocation(&intermediate, anchor).await?;
        }

        self.cache.insert(fingerprint, key.clone());
        Ok(key)
    }

    fn validate_path<'r>(
        &'r self,
        leaf: &ParsedCert,
        intermediate: &ParsedCert,
        root: &ParsedCert,
        now: i64,
    ) -> VerifyResult<&'r ParsedCert> {
        leaf.verify_issued_by(intermediate)
            .map_err(VerificationError::invalid_chain)?;

        let anchor = self
            .roots
            .iter()
            .filter(|anchor| anchor.subject == intermediate.issuer)
            .find(|anchor| intermediate.verify_issued_by(anchor).is_ok())
            .ok_or_else(|| {
                VerificationError::invalid_chain(format!(
                    "intermediate '{}' is not signed by a trusted root",
                    intermediate.subject_display
                ))
            })?;

        if root.subject != anchor.subject || root.spki != anchor.spki {
            return Err(VerificationError::invalid_chain(
                "chain root does not match the trusted root",
            ));
        }

        for cert in [leaf, intermediate, root, anchor] {
            if !cert.is_valid_at(now) {
                return Err(VerificationError::invalid_chain(format!(
                    "'{}' is not valid at {}",
                    cert.subject_display,
                    DateTime::<Utc>::from_timestamp(now, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| now.to_string())
                )));
            }
        }

        intermediate
            .check_ca(0)
            .map_err(VerificationError::invalid_chain)?;
        anchor.check_ca(1).map_err(VerificationError::invalid_chain)?;

        Ok(anchor)
    }

    async fn check_revocation(&self, cert: &ParsedCert, issuer: &ParsedCert) -> VerifyResult<()> {
        let outcome = tokio::time::timeout(
            self.ocsp_timeout,
            self.revocation.check(&cert.der, &issuer.der),
        )
        .await;

        match outcome {
            Ok(Ok(RevocationStatus::Good)) => {
                debug!(subject = %cert.subject_display, "revocation status good");
                Ok(())
            }
            Ok(Ok(status)) => {
                warn!(subject = %cert.subject_display, status = %status, "certificate failed revocation check");
                Err(VerificationError::invalid_chain(format!(
                    "'{}' revocation status is {status}",
                    cert.subject_display
                )))
            }
            Ok(Err(RevocationError::Transport { message })) => {
                warn!(subject = %cert.subject_display, error = %message, "revocation responder unavailable");
                Err(VerificationError::retryable(format!(
                    "revocation check for '{}' failed: {message}",
                    cert.subject_display
                )))
            }
            Ok(Err(RevocationError::InvalidResponse { message })) => {
                warn!(subject = %cert.subject_display, error = %message, "invalid revocation response");
                Err(VerificationError::invalid_chain(format!(
                    "revocation response for '{}' is invalid: {message}",
                    cert.subject_display
                )))
            }
            Err(_) => {
                warn!(subject = %cert.subject_display, timeout = ?self.ocsp_timeout, "revocation check timed out");
                Err(VerificationError::retryable(format!(
                    "revocation check for '{}' timed out after {:?}",
                    cert.subject_display, self.ocsp_timeout
                )))
            }
        }
    }
}

fn parse(der: &[u8], role: &str) -> VerifyResult<ParsedCert> {
    ParsedCert::from_der(der)
        .map_err(|e| VerificationError::invalid_certificate(format!("{role} certificate: {e}")))
}
