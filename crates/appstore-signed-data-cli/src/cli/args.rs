use appstore_signed_data::{Environment, PayloadKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "appstore-verify",
    version,
    about = "Verify App Store signed data (transactions, renewal info, notifications)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Verify a signed token and print its decoded payload as JSON
    Verify(VerifyArgs),
    /// List the payload kinds `verify --kind` accepts
    Kinds,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Payload kind: transaction, renewal-info, notification, summary,
    /// app-transaction or realtime-request
    #[arg(long, short = 'k', default_value = "transaction")]
    pub kind: PayloadKind,

    /// File holding the token; reads stdin when omitted or `-`
    pub token: Option<PathBuf>,

    /// DER-encoded trusted root certificate (repeatable)
    #[arg(long = "root", required = true, num_args = 1)]
    pub roots: Vec<PathBuf>,

    #[arg(long, env = "APPSTORE_BUNDLE_ID")]
    pub bundle_id: String,

    #[arg(long, env = "APPSTORE_ENVIRONMENT", default_value = "Production")]
    pub environment: Environment,

    /// Required for Production
    #[arg(long, env = "APPSTORE_APP_APPLE_ID")]
    pub app_apple_id: Option<i64>,

    /// Check revocation over OCSP and validate against the current time
    #[arg(long)]
    pub online: bool,

    /// OCSP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub ocsp_timeout: u64,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}
