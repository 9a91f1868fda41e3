//! Verification of App Store signed data.
//!
//! The App Store delivers transactions, renewal info, server notifications,
//! app transactions and retention-messaging requests as compact JWS tokens
//! signed with ES256. This crate turns such a token into a typed payload
//! only after:
//!
//! - decoding the envelope and its `x5c` certificate chain
//! - validating the chain against pinned root certificates
//! - optionally checking revocation over OCSP
//! - verifying the signature with the leaf key
//! - checking bundle id, app Apple id and environment
//!
//! Verified chains are cached by fingerprint, so steady-state verification
//! costs one signature check.
//!
//! # Quick Start
//!
//! ```no_run
//! use appstore_signed_data::{Environment, SignedDataVerifier, VerifierConfig};
//!
//! # async fn example(apple_root_ca_g3: Vec<u8>, token: &str) -> anyhow::Result<()> {
//! let config = VerifierConfig::new("com.example.app", Environment::Production)
//!     .with_app_apple_id(1234567890)
//!     .with_online_checks(true);
//! let verifier = SignedDataVerifier::new([apple_root_ca_g3], config)?;
//!
//! let transaction = verifier.verify_and_decode_transaction(token).await?;
//! println!("verified transaction {:?}", transaction.transaction_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Failures
//!
//! Every failure is a [`VerificationError`] whose [`VerificationStatus`] tag
//! says why. Only `RetryableVerificationFailure` (OCSP responder unavailable)
//! may succeed on retry.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `APPSTORE_BUNDLE_ID` | Expected bundle id |
//! | `APPSTORE_ENVIRONMENT` | `Production`, `Sandbox`, `Xcode` or `LocalTesting` (default: Production) |
//! | `APPSTORE_APP_APPLE_ID` | App Apple id (required for Production) |
//! | `APPSTORE_ENABLE_ONLINE_CHECKS` | Check revocation over OCSP |
//! | `APPSTORE_CERT_CACHE_MAX_SIZE` | Certificate cache capacity (default: 32) |
//! | `APPSTORE_CERT_CACHE_TTL` | Certificate cache TTL in seconds (default: 900) |
//! | `APPSTORE_OCSP_TIMEOUT` | OCSP request timeout in seconds (default: 30) |

pub mod cache;
pub mod chain;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ocsp;
pub mod revocation;
pub mod signature;
pub mod types;
pub mod verifier;

// Re-export main types
pub use cache::{
    CacheEntry, CacheStore, CertificateCache, ChainFingerprint,
    DEFAULT_CERTIFICATE_CACHE_MAX_SIZE, DEFAULT_CERTIFICATE_CACHE_TTL,
};
pub use chain::{ChainVerifier, TrustRoots, VerifiedKey};
pub use config::VerifierConfig;
pub use envelope::{JwsHeader, SignedEnvelope};
pub use error::{ConfigError, VerificationError, VerificationStatus, VerifyResult};
pub use ocsp::HttpOcspChecker;
pub use revocation::{NoRevocationCheck, RevocationChecker, RevocationError, RevocationStatus};
pub use types::{
    AppTransaction, DecodedNotification, DecodedRealtimeRequestBody, Environment,
    ExternalPurchaseToken, JwsRenewalInfoDecodedPayload, JwsTransactionDecodedPayload,
    NotificationData, NotificationSummary, ResponseBodyV2DecodedPayload,
};
pub use verifier::{DecodedPayload, PayloadKind, SignedDataVerifier};
