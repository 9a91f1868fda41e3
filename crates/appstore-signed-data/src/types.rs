//! Environment and decoded payload models.
//!
//! Field names follow the App Store JSON (camelCase). Every field except the
//! environment is tolerant: unknown enum raw values are kept as plain
//! strings/integers so new App Store values never break decoding.

use serde::{Deserialize, Serialize};

/// Server environment a payload was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    Production,
    Sandbox,
    Xcode,
    LocalTesting,
}

impl Environment {
    /// Wire name (`"Production"`, `"Sandbox"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Sandbox => "Sandbox",
            Self::Xcode => "Xcode",
            Self::LocalTesting => "LocalTesting",
        }
    }

    /// Payloads from these environments are signed locally and carry no
    /// App Store chain.
    pub fn skips_signature_verification(&self) -> bool {
        matches!(self, Self::Xcode | Self::LocalTesting)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Production" => Ok(Self::Production),
            "Sandbox" => Ok(Self::Sandbox),
            "Xcode" => Ok(Self::Xcode),
            "LocalTesting" => Ok(Self::LocalTesting),
            other => Err(format!(
                "unknown environment '{other}' (expected Production, Sandbox, Xcode or LocalTesting)"
            )),
        }
    }
}

/// Decoded payload of a signed transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsTransactionDecodedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_order_line_item_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_group_identifier: Option<String>,

    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_purchase_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,

    /// Product type (`Auto-Renewable Subscription`, `Consumable`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app_ownership_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_upgraded: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_type: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Price in milliunits of `currency`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_discount_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_transaction_id: Option<String>,

    /// ISO 8601 duration of the offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_period: Option<String>,
}

/// Decoded payload of signed subscription renewal info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsRenewalInfoDecodedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_intent: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_renew_product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_renew_status: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_in_billing_retry_period: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_increase_status: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_expires_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_type: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_subscription_start_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_price: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_discount_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_win_back_offer_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_period: Option<String>,
}

/// Decoded payload of an App Store Server Notification (V2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyV2DecodedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(
        default,
        rename = "notificationUUID",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<NotificationSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_purchase_token: Option<ExternalPurchaseToken>,
}

/// App metadata and signed data of a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_version: Option<String>,

    /// Nested signed transaction (compact JWS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction_info: Option<String>,

    /// Nested signed renewal info (compact JWS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_renewal_info: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_request_reason: Option<String>,
}

/// Summary of a renewal-date-extension request, carried by
/// `RENEWAL_EXTENSION` notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront_country_codes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<i64>,
}

/// External purchase token carried by `EXTERNAL_PURCHASE_TOKEN` notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPurchaseToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_purchase_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_creation_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

impl ExternalPurchaseToken {
    /// Sandbox tokens are recognizable by their id prefix only.
    pub fn environment(&self) -> Environment {
        match &self.external_purchase_id {
            Some(id) if id.starts_with("SANDBOX") => Environment::Sandbox,
            _ => Environment::Production,
        }
    }
}

/// Decoded app transaction (the app-level receipt).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTransaction {
    /// Environment the receipt was issued in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_type: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_external_identifier: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_creation_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_purchase_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_application_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_verification: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_verification_nonce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preorder_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_platform: Option<String>,
}

/// Decoded body of a Retention Messaging realtime request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRealtimeRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_locale: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,
}

/// A verified notification together with its verified nested payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedNotification {
    pub payload: ResponseBodyV2DecodedPayload,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<JwsTransactionDecodedPayload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<JwsRenewalInfoDecodedPayload>,
}
