//! Signed-data verification pipeline.
//!
//! Each call runs envelope decoding, chain validation, signature checking,
//! payload decoding and the environment/app checks in a single pass and
//! stops at the first failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CertificateCache;
use crate::chain::{ChainVerifier, TrustRoots};
use crate::config::VerifierConfig;
use crate::envelope::{claimed_signed_date, decode_payload_unverified, SignedEnvelope};
use crate::error::{ConfigError, VerificationError, VerifyResult};
use crate::ocsp::HttpOcspChecker;
use crate::revocation::{NoRevocationCheck, RevocationChecker};
use crate::signature::verify_es256;
use crate::types::{
    AppTransaction, DecodedNotification, DecodedRealtimeRequestBody, Environment,
    JwsRenewalInfoDecodedPayload, JwsTransactionDecodedPayload, NotificationSummary,
    ResponseBodyV2DecodedPayload,
};

/// Kind of signed payload a token is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Transaction,
    RenewalInfo,
    Notification,
    Summary,
    AppTransaction,
    RealtimeRequest,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 6] = [
        Self::Transaction,
        Self::RenewalInfo,
        Self::Notification,
        Self::Summary,
        Self::AppTransaction,
        Self::RealtimeRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::RenewalInfo => "renewal-info",
            Self::Notification => "notification",
            Self::Summary => "summary",
            Self::AppTransaction => "app-transaction",
            Self::RealtimeRequest => "realtime-request",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown payload kind '{s}'"))
    }
}

/// A verified payload of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum DecodedPayload {
    Transaction(JwsTransactionDecodedPayload),
    RenewalInfo(JwsRenewalInfoDecodedPayload),
    Notification(DecodedNotification),
    Summary(NotificationSummary),
    AppTransaction(AppTransaction),
    RealtimeRequest(DecodedRealtimeRequestBody),
}

impl DecodedPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Transaction(_) => PayloadKind::Transaction,
            Self::RenewalInfo(_) => PayloadKind::RenewalInfo,
            Self::Notification(_) => PayloadKind::Notification,
            Self::Summary(_) => PayloadKind::Summary,
            Self::AppTransaction(_) => PayloadKind::AppTransaction,
            Self::RealtimeRequest(_) => PayloadKind::RealtimeRequest,
        }
    }
}

/// Verifies App Store signed data for one app in one environment.
///
/// Cheap to clone; clones share the certificate cache.
#[derive(Debug, Clone)]
pub struct SignedDataVerifier {
    config: Arc<VerifierConfig>,
    chain: ChainVerifier,
}

impl SignedDataVerifier {
    /// Create a verifier. Revocation is checked over HTTP OCSP when
    /// `config.enable_online_checks` is set.
    pub fn new<I, C>(root_certificates: I, config: VerifierConfig) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let revocation: Arc<dyn RevocationChecker> = if config.enable_online_checks {
            Arc::new(HttpOcspChecker::new(config.ocsp_timeout())?)
        } else {
            Arc::new(NoRevocationCheck)
        };
        Self::with_revocation_checker(root_certificates, config, revocation)
    }

    /// Create a verifier with a custom revocation checker.
    pub fn with_revocation_checker<I, C>(
        root_certificates: I,
        config: VerifierConfig,
        revocation: Arc<dyn RevocationChecker>,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        config.validate()?;
        let roots = TrustRoots::from_der(root_certificates)?;
        let cache = CertificateCache::new(
            config.certificate_cache_max_size,
            config.certificate_cache_ttl(),
        );
        let chain = ChainVerifier::new(roots, cache, revocation, config.ocsp_timeout());

        Ok(Self {
            config: Arc::new(config),
            chain,
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Cache of verified certificate chains.
    pub fn certificate_cache(&self) -> &CertificateCache {
        self.chain.cache()
    }

    /// Verify `token` as a payload of `kind`.
    pub async fn verify_and_decode(
        &self,
        kind: PayloadKind,
        token: &str,
    ) -> VerifyResult<DecodedPayload> {
        Ok(match kind {
            PayloadKind::Transaction => {
                DecodedPayload::Transaction(self.verify_and_decode_transaction(token).await?)
            }
            PayloadKind::RenewalInfo => {
                DecodedPayload::RenewalInfo(self.verify_and_decode_renewal_info(token).await?)
            }
            PayloadKind::Notification => {
                DecodedPayload::Notification(self.verify_and_decode_notification(token).await?)
            }
            PayloadKind::Summary => {
                DecodedPayload::Summary(self.verify_and_decode_summary(token).await?)
            }
            PayloadKind::AppTransaction => DecodedPayload::AppTransaction(
                self.verify_and_decode_app_transaction(token).await?,
            ),
            PayloadKind::RealtimeRequest => DecodedPayload::RealtimeRequest(
                self.verify_and_decode_realtime_request(token).await?,
            ),
        })
    }

    /// Verify a signed transaction.
    pub async fn verify_and_decode_transaction(
        &self,
        token: &str,
    ) -> VerifyResult<JwsTransactionDecodedPayload> {
        let result = async {
            let tx: JwsTransactionDecodedPayload = self.verify_payload(token).await?;
            self.check_bundle_id(tx.bundle_id.as_deref())?;
            self.check_environment(tx.environment)?;
            Ok::<_, VerificationError>(tx)
        }
        .await;
        observe(PayloadKind::Transaction, result)
    }

    /// Verify signed subscription renewal info.
    pub async fn verify_and_decode_renewal_info(
        &self,
        token: &str,
    ) -> VerifyResult<JwsRenewalInfoDecodedPayload> {
        let result = async {
            let info: JwsRenewalInfoDecodedPayload = self.verify_payload(token).await?;
            self.check_environment(info.environment)?;
            Ok::<_, VerificationError>(info)
        }
        .await;
        observe(PayloadKind::RenewalInfo, result)
    }

    /// Verify a server notification and the signed data nested inside it.
    pub async fn verify_and_decode_notification(
        &self,
        token: &str,
    ) -> VerifyResult<DecodedNotification> {
        let result = async {
            let payload = self.verify_notification_payload(token).await?;

            let nested = payload.data.as_ref();
            let transaction = match nested.and_then(|d| d.signed_transaction_info.as_deref()) {
                Some(nested_token) => Some(self.verify_and_decode_transaction(nested_token).await?),
                None => None,
            };
            let renewal_info = match nested.and_then(|d| d.signed_renewal_info.as_deref()) {
                Some(nested_token) => {
                    Some(self.verify_and_decode_renewal_info(nested_token).await?)
                }
                None => None,
            };

            Ok::<_, VerificationError>(DecodedNotification {
                payload,
                transaction,
                renewal_info,
            })
        }
        .await;
        observe(PayloadKind::Notification, result)
    }

    /// Verify a notification that carries a request summary.
    pub async fn verify_and_decode_summary(&self, token: &str) -> VerifyResult<NotificationSummary> {
        let result = async {
            let payload = self.verify_notification_payload(token).await?;
            payload
                .summary
                .ok_or_else(|| VerificationError::malformed("notification carries no summary"))
        }
        .await;
        observe(PayloadKind::Summary, result)
    }

    /// Verify a signed app transaction.
    pub async fn verify_and_decode_app_transaction(
        &self,
        token: &str,
    ) -> VerifyResult<AppTransaction> {
        let result = async {
            let app_tx: AppTransaction = self.verify_payload(token).await?;
            self.check_app_identifiers(app_tx.bundle_id.as_deref(), app_tx.app_apple_id)?;
            self.check_environment(app_tx.receipt_type)?;
            Ok::<_, VerificationError>(app_tx)
        }
        .await;
        observe(PayloadKind::AppTransaction, result)
    }

    /// Verify a signed Retention Messaging realtime request.
    pub async fn verify_and_decode_realtime_request(
        &self,
        token: &str,
    ) -> VerifyResult<DecodedRealtimeRequestBody> {
        let result = async {
            let request: DecodedRealtimeRequestBody = self.verify_payload(token).await?;
            self.check_app_apple_id(request.app_apple_id)?;
            self.check_environment(request.environment)?;
            Ok::<_, VerificationError>(request)
        }
        .await;
        observe(PayloadKind::RealtimeRequest, result)
    }

    async fn verify_notification_payload(
        &self,
        token: &str,
    ) -> VerifyResult<ResponseBodyV2DecodedPayload> {
        let payload: ResponseBodyV2DecodedPayload = self.verify_payload(token).await?;

        let (bundle_id, app_apple_id, environment) = if let Some(data) = &payload.data {
            (data.bundle_id.as_deref(), data.app_apple_id, data.environment)
        } else if let Some(summary) = &payload.summary {
            (
                summary.bundle_id.as_deref(),
                summary.app_apple_id,
                summary.environment,
            )
        } else if let Some(purchase_token) = &payload.external_purchase_token {
            (
                purchase_token.bundle_id.as_deref(),
                purchase_token.app_apple_id,
                Some(purchase_token.environment()),
            )
        } else {
            (None, None, None)
        };

        self.check_app_identifiers(bundle_id, app_apple_id)?;
        self.check_environment(environment)?;
        Ok(payload)
    }

    /// Authenticate `token` and decode its payload as `T`.
    async fn verify_payload<T: DeserializeOwned>(&self, token: &str) -> VerifyResult<T> {
        let payload = if self.config.environment.skips_signature_verification() {
            debug!(environment = %self.config.environment, "skipping signature verification");
            decode_payload_unverified(token)?
        } else {
            let envelope = SignedEnvelope::decode(token)?;
            let online = self.config.enable_online_checks;
            let effective_time = if online {
                Utc::now()
            } else {
                claimed_signed_date(&envelope.payload)?
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .unwrap_or_else(Utc::now)
            };

            let key = self
                .chain
                .verify(envelope.certificate_chain(), online, effective_time)
                .await?;
            verify_es256(&key, envelope.signing_input.as_bytes(), &envelope.signature()?)?;
            envelope.payload
        };

        serde_json::from_slice(&payload).map_err(|e| {
            VerificationError::malformed(format!("payload does not match the expected shape: {e}"))
        })
    }

    fn check_bundle_id(&self, actual: Option<&str>) -> VerifyResult<()> {
        if actual == Some(self.config.bundle_id.as_str()) {
            return Ok(());
        }
        Err(VerificationError::invalid_app_identifier(format!(
            "bundle id {} does not match {}",
            actual.unwrap_or("<missing>"),
            self.config.bundle_id
        )))
    }

    /// App Apple ids are only assigned in Production.
    fn check_app_apple_id(&self, actual: Option<i64>) -> VerifyResult<()> {
        if self.config.environment != Environment::Production || actual == self.config.app_apple_id
        {
            return Ok(());
        }
        Err(VerificationError::invalid_app_identifier(format!(
            "app Apple id {} does not match {}",
            display_opt(actual),
            display_opt(self.config.app_apple_id)
        )))
    }

    fn check_app_identifiers(&self, bundle_id: Option<&str>, app_apple_id: Option<i64>) -> VerifyResult<()> {
        self.check_bundle_id(bundle_id)?;
        self.check_app_apple_id(app_apple_id)
    }

    fn check_environment(&self, actual: Option<Environment>) -> VerifyResult<()> {
        if actual == Some(self.config.environment) {
            return Ok(());
        }
        Err(VerificationError::InvalidEnvironment {
            expected: self.config.environment.to_string(),
            actual: actual.map_or_else(|| "<missing>".to_string(), |e| e.to_string()),
        })
    }
}

fn display_opt(value: Option<i64>) -> String {
    value.map_or_else(|| "<missing>".to_string(), |v| v.to_string())
}

fn observe<T>(kind: PayloadKind, result: VerifyResult<T>) -> VerifyResult<T> {
    match &result {
        Ok(_) => debug!(kind = %kind, "signed data verified"),
        Err(e) => warn!(kind = %kind, status = %e.status(), error = %e, "signed data rejected"),
    }
    result
}
