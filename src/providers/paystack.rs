// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Paystack integration for hosted deposit payments.
//!
//! Two concerns live here: the outbound client (initialize a hosted payment
//! session, verify a payment) and webhook authenticity (HMAC-SHA512 over the
//! raw notification bytes).
//!
//! Initialization is a mutating call and is never retried; verification is
//! an idempotent read and retries a bounded number of times on transport
//! failures.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha512;

const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport retries for the idempotent verification read.
const VERIFY_RETRIES: usize = 2;

/// Header carrying the hex HMAC-SHA512 signature of the webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, thiserror::Error)]
pub enum PaystackError {
    #[error("Paystack configuration missing: {0}")]
    MissingConfig(String),

    #[error("Paystack request failed: {0}")]
    Request(String),

    #[error("Paystack response was invalid: {0}")]
    InvalidResponse(String),
}

/// Outcome of a verification read.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub status: String,
    pub amount_minor: u64,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    base_url: String,
    secret_key: String,
    callback_base_url: Option<String>,
    http: Client,
}

impl PaystackClient {
    pub fn is_configured() -> bool {
        std::env::var("PAYSTACK_SECRET_KEY").map_or(false, |v| !v.trim().is_empty())
    }

    pub fn from_env() -> Result<Self, PaystackError> {
        let secret_key = std::env::var("PAYSTACK_SECRET_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PaystackError::MissingConfig("PAYSTACK_SECRET_KEY".to_string()))?;
        let base_url = std::env::var("PAYSTACK_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let callback_base_url = std::env::var("APP_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self::new(base_url, secret_key, callback_base_url)
    }

    pub fn new(
        base_url: String,
        secret_key: String,
        callback_base_url: Option<String>,
    ) -> Result<Self, PaystackError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaystackError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            secret_key,
            callback_base_url,
            http,
        })
    }

    /// Initiate a hosted payment session.
    ///
    /// Mutating call: one attempt, no retries. Returns the hosted page URL
    /// the depositor is redirected to.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: u64,
        reference: &str,
    ) -> Result<String, PaystackError> {
        let mut payload = json!({
            "email": email,
            "amount": amount_minor,
            "reference": reference,
        });
        if let Some(base) = &self.callback_base_url {
            payload["callback_url"] =
                Value::String(format!("{base}/wallet/deposit/{reference}/status"));
        }

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaystackError::Request(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaystackError::InvalidResponse(e.to_string()))?;

        if !body.get("status").and_then(Value::as_bool).unwrap_or(false) {
            return Err(PaystackError::InvalidResponse(format!(
                "initialization rejected: {}",
                body.get("message").and_then(Value::as_str).unwrap_or("unknown")
            )));
        }

        body.pointer("/data/authorization_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PaystackError::InvalidResponse("missing authorization_url in response".to_string())
            })
    }

    /// Verify a payment by reference.
    ///
    /// Idempotent read; retries transport failures up to [`VERIFY_RETRIES`]
    /// times.
    pub async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedPayment, PaystackError> {
        let url = format!("{}/transaction/verify/{reference}", self.base_url);

        let mut last_err = None;
        for attempt in 0..=VERIFY_RETRIES {
            let result = self
                .http
                .get(&url)
                .bearer_auth(&self.secret_key)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let body: Value = response
                        .json()
                        .await
                        .map_err(|e| PaystackError::InvalidResponse(e.to_string()))?;
                    return parse_verification(&body);
                }
                Err(e) => {
                    tracing::warn!(reference, attempt, error = %e, "verification read failed");
                    last_err = Some(e);
                }
            }
        }

        Err(PaystackError::Request(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "verification failed".to_string()),
        ))
    }

    /// Check webhook authenticity: HMAC-SHA512 over the exact raw payload
    /// bytes, compared constant-time against the hex signature header.
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(self.secret_key.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        mac.verify_slice(&signature).is_ok()
    }
}

fn parse_verification(body: &Value) -> Result<VerifiedPayment, PaystackError> {
    if !body.get("status").and_then(Value::as_bool).unwrap_or(false) {
        return Err(PaystackError::InvalidResponse(
            "verification rejected".to_string(),
        ));
    }

    let status = body
        .pointer("/data/status")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PaystackError::InvalidResponse("missing payment status in response".to_string())
        })?
        .to_string();
    let amount_minor = body
        .pointer("/data/amount")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            PaystackError::InvalidResponse("missing payment amount in response".to_string())
        })?;
    let paid_at = body
        .pointer("/data/paid_at")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(VerifiedPayment {
        status,
        amount_minor,
        paid_at,
    })
}
