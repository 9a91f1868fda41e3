use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use appstore_signed_data::{SignedDataVerifier, VerificationError, VerifierConfig};
use serde_json::json;

use crate::cli::args::VerifyArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: VerifyArgs) -> anyhow::Result<i32> {
    let token = read_token(args.token.as_deref())?;
    let roots = args
        .roots
        .iter()
        .map(|path| {
            std::fs::read(path).with_context(|| format!("failed to read root {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut config = VerifierConfig::new(args.bundle_id.clone(), args.environment)
        .with_online_checks(args.online)
        .with_ocsp_timeout(Duration::from_secs(args.ocsp_timeout));
    if let Some(id) = args.app_apple_id {
        config = config.with_app_apple_id(id);
    }

    let verifier =
        SignedDataVerifier::new(roots, config).context("failed to configure verifier")?;

    tracing::debug!(kind = %args.kind, "verifying token");
    let (output, code) = match verifier.verify_and_decode(args.kind, &token).await {
        Ok(payload) => (
            json!({"status": "verified", "result": payload}),
            SUCCESS,
        ),
        Err(e) => (rejection(&e), e.exit_code()),
    };

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(code)
}

fn rejection(e: &VerificationError) -> serde_json::Value {
    json!({
        "status": e.status().to_string(),
        "error": e.to_string(),
        "retryable": e.is_retryable(),
    })
}

fn read_token(path: Option<&Path>) -> anyhow::Result<String> {
    let raw = match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read token from {}", p.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read token from stdin")?;
            buf
        }
    };

    let token = raw.trim();
    anyhow::ensure!(!token.is_empty(), "token is empty");
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_token_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.jws");
        std::fs::write(&path, "  a.b.c\n").unwrap();

        assert_eq!(read_token(Some(&path)).unwrap(), "a.b.c");
    }

    #[test]
    fn test_read_token_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.jws");
        std::fs::write(&path, "\n").unwrap();

        assert!(read_token(Some(&path)).is_err());
    }

    #[test]
    fn test_rejection_shape() {
        let err = VerificationError::InvalidChainLength {
            expected: 3,
            actual: 2,
        };

        let value = rejection(&err);
        assert_eq!(value["status"], "invalid-chain-length");
        assert_eq!(value["retryable"], false);
        assert!(value["error"].as_str().unwrap().contains('2'));
    }
}
