//! Certificate revocation contract.
//!
//! The chain verifier asks a [`RevocationChecker`] about each non-root
//! certificate when online checks are enabled. The production implementation
//! is [`HttpOcspChecker`](crate::ocsp::HttpOcspChecker).

use async_trait::async_trait;

/// Revocation state reported by a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    Good,
    Revoked,
    Unknown,
}

impl std::fmt::Display for RevocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => f.write_str("good"),
            Self::Revoked => f.write_str("revoked"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Why a revocation check produced no status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevocationError {
    /// Responder unreachable, timed out, or asked to retry later.
    #[error("revocation responder unavailable: {message}")]
    Transport { message: String },

    /// Response could not be parsed or authenticated.
    #[error("invalid revocation response: {message}")]
    InvalidResponse { message: String },
}

impl RevocationError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

/// Source of revocation status for a certificate.
#[async_trait]
pub trait RevocationChecker: Send + Sync {
    /// Status of `certificate` (DER) as issued by `issuer` (DER).
    async fn check(
        &self,
        certificate: &[u8],
        issuer: &[u8],
    ) -> Result<RevocationStatus, RevocationError>;
}

/// Checker that reports every certificate as good.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevocationCheck;

#[async_trait]
impl RevocationChecker for NoRevocationCheck {
    async fn check(
        &self,
        _certificate: &[u8],
        _issuer: &[u8],
    ) -> Result<RevocationStatus, RevocationError> {
        Ok(RevocationStatus::Good)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_revocation_check_is_always_good() {
        let checker: Box<dyn RevocationChecker> = Box::new(NoRevocationCheck);
        assert_eq!(
            checker.check(b"cert", b"issuer").await.unwrap(),
            RevocationStatus::Good
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            RevocationError::transport("timed out").to_string(),
            "revocation responder unavailable: timed out"
        );
    }
}
