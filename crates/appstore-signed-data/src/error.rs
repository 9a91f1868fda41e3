//! Error types for signed-data verification.

/// Classification tag of a verification failure.
///
/// Every failure maps to exactly one tag, so callers can switch on the tag
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    MalformedEnvelope,
    InvalidChainLength,
    InvalidCertificate,
    InvalidChain,
    RetryableVerificationFailure,
    InvalidEnvironment,
    InvalidAppIdentifier,
    VerificationFailure,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MalformedEnvelope => "malformed-envelope",
            Self::InvalidChainLength => "invalid-chain-length",
            Self::InvalidCertificate => "invalid-certificate",
            Self::InvalidChain => "invalid-chain",
            Self::RetryableVerificationFailure => "retryable-verification-failure",
            Self::InvalidEnvironment => "invalid-environment",
            Self::InvalidAppIdentifier => "invalid-app-identifier",
            Self::VerificationFailure => "verification-failure",
        };
        f.write_str(s)
    }
}

/// Verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Token is not a well-formed three-part JWS, or a segment failed to decode.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope { message: String },

    /// The `x5c` chain does not hold exactly leaf, intermediate and root.
    #[error("invalid certificate chain length: expected {expected}, got {actual}")]
    InvalidChainLength { expected: usize, actual: usize },

    /// A certificate failed to parse or lacks a required property.
    #[error("invalid certificate: {message}")]
    InvalidCertificate { message: String },

    /// Trust path, validity window or revocation check failed.
    #[error("invalid certificate chain: {message}")]
    InvalidChain { message: String },

    /// The revocation check could not reach its responder.
    #[error("retryable verification failure: {message}")]
    RetryableVerificationFailure { message: String },

    /// Payload environment differs from the verifier's environment.
    #[error("invalid environment: expected {expected}, got {actual}")]
    InvalidEnvironment { expected: String, actual: String },

    /// Payload bundle id or app Apple id differs from the configured one.
    #[error("invalid app identifier: {message}")]
    InvalidAppIdentifier { message: String },

    /// Signature does not match the signing input.
    #[error("verification failure: {message}")]
    VerificationFailure { message: String },
}

impl VerificationError {
    /// Classification tag.
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::MalformedEnvelope { .. } => VerificationStatus::MalformedEnvelope,
            Self::InvalidChainLength { .. } => VerificationStatus::InvalidChainLength,
            Self::InvalidCertificate { .. } => VerificationStatus::InvalidCertificate,
            Self::InvalidChain { .. } => VerificationStatus::InvalidChain,
            Self::RetryableVerificationFailure { .. } => {
                VerificationStatus::RetryableVerificationFailure
            }
            Self::InvalidEnvironment { .. } => VerificationStatus::InvalidEnvironment,
            Self::InvalidAppIdentifier { .. } => VerificationStatus::InvalidAppIdentifier,
            Self::VerificationFailure { .. } => VerificationStatus::VerificationFailure,
        }
    }

    /// Whether retrying the whole verification later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableVerificationFailure { .. })
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Input issues
            Self::MalformedEnvelope { .. } => 1,

            // Trust issues
            Self::InvalidChainLength { .. } => 3,
            Self::InvalidCertificate { .. } => 3,
            Self::InvalidChain { .. } => 3,
            Self::VerificationFailure { .. } => 3,

            // Context issues
            Self::InvalidEnvironment { .. } => 4,
            Self::InvalidAppIdentifier { .. } => 4,

            // Transient
            Self::RetryableVerificationFailure { .. } => 5,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_certificate(message: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_chain(message: impl Into<String>) -> Self {
        Self::InvalidChain {
            message: message.into(),
        }
    }

    pub(crate) fn retryable(message: impl Into<String>) -> Self {
        Self::RetryableVerificationFailure {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_app_identifier(message: impl Into<String>) -> Self {
        Self::InvalidAppIdentifier {
            message: message.into(),
        }
    }

    pub(crate) fn signature_mismatch(message: impl Into<String>) -> Self {
        Self::VerificationFailure {
            message: message.into(),
        }
    }
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Errors raised while constructing a verifier.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No trust roots were supplied.
    #[error("at least one trusted root certificate is required")]
    EmptyTrustRoots,

    /// A trust root failed to parse.
    #[error("trusted root #{index} is not a valid DER certificate: {message}")]
    InvalidTrustRoot { index: usize, message: String },

    /// Production verifiers must know the app's Apple id.
    #[error("app_apple_id is required when the environment is Production")]
    MissingAppAppleId,

    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The HTTP client for revocation checks could not be built.
    #[error("failed to create HTTP client: {message}")]
    Http { message: String },
}
