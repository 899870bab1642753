//! Contract safety classification.
//!
//! The primary source is a honeypot-detection API. When it cannot be
//! reached the checker falls back to reading the token's bytecode over
//! JSON-RPC: no code or oversized code is suspicious.

use std::collections::HashMap;

use arb_core::SafetyStatus;
use arb_price::rpc::hex_byte_len;
use arb_price::RpcClient;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SafetyConfig;
use crate::error::{VerifyError, VerifyResult};

/// Classifies a token contract.
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    /// A missing token address classifies as [`SafetyStatus::Unknown`].
    async fn check(&self, token_address: Option<&str>, chain: &str) -> SafetyStatus;
}

/// Always returns the same status. Used when checks are disabled.
#[derive(Debug, Clone, Copy)]
pub struct StaticSafety(pub SafetyStatus);

#[async_trait]
impl SafetyChecker for StaticSafety {
    async fn check(&self, _token_address: Option<&str>, _chain: &str) -> SafetyStatus {
        self.0
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Relevant fields of a honeypot API response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HoneypotReport {
    #[serde(rename = "IsHoneypot", default)]
    pub is_honeypot: bool,
    #[serde(rename = "BuyTax", default)]
    pub buy_tax: Option<Decimal>,
    #[serde(rename = "SellTax", default)]
    pub sell_tax: Option<Decimal>,
    #[serde(rename = "CanSell", default)]
    pub can_sell: Option<bool>,
}

/// Classify a honeypot report. Checked in order: honeypot flag, taxes,
/// ability to sell.
pub fn classify_report(report: &HoneypotReport, max_tax_pct: Decimal) -> SafetyStatus {
    if report.is_honeypot {
        return SafetyStatus::Blocked;
    }
    let buy_tax = report.buy_tax.unwrap_or_default();
    let sell_tax = report.sell_tax.unwrap_or_default();
    if buy_tax > max_tax_pct || sell_tax > max_tax_pct {
        return SafetyStatus::Suspicious;
    }
    if report.can_sell == Some(false) {
        return SafetyStatus::Blocked;
    }
    SafetyStatus::Ok
}

/// Classify deployed bytecode (`0x`-prefixed hex).
pub fn classify_code(code_hex: &str, max_code_bytes: usize) -> SafetyStatus {
    match hex_byte_len(code_hex) {
        0 => SafetyStatus::Suspicious,
        n if n > max_code_bytes => SafetyStatus::Suspicious,
        _ => SafetyStatus::Ok,
    }
}

// ============================================================================
// Bytecode fallback
// ============================================================================

/// Bytecode check over per-chain JSON-RPC endpoints.
pub struct ContractCodeChecker {
    rpcs: HashMap<String, RpcClient>,
    max_code_bytes: usize,
}

impl ContractCodeChecker {
    pub fn new(config: &SafetyConfig) -> VerifyResult<Self> {
        let mut rpcs = HashMap::new();
        for (chain, url) in &config.rpc_urls {
            rpcs.insert(chain.to_lowercase(), RpcClient::new(url.clone(), config.timeout())?);
        }
        Ok(Self {
            rpcs,
            max_code_bytes: config.max_code_bytes,
        })
    }

    /// Returns [`SafetyStatus::Unknown`] when no RPC is configured for the
    /// chain or the call fails.
    pub async fn check(&self, token_address: &str, chain: &str) -> SafetyStatus {
        let Some(rpc) = self.rpcs.get(&chain.to_lowercase()) else {
            debug!(chain, "No RPC configured for bytecode check");
            return SafetyStatus::Unknown;
        };
        match rpc.get_code(token_address).await {
            Ok(code) => {
                let status = classify_code(&code, self.max_code_bytes);
                debug!(token = token_address, bytes = hex_byte_len(&code), %status, "Bytecode check");
                status
            }
            Err(e) => {
                warn!(token = token_address, error = %e, "Bytecode check failed");
                SafetyStatus::Unknown
            }
        }
    }
}

// ============================================================================
// Honeypot API
// ============================================================================

/// Honeypot API with bytecode fallback.
pub struct HoneypotChecker {
    client: Client,
    api_url: String,
    max_tax_pct: Decimal,
    fallback: ContractCodeChecker,
}

impl HoneypotChecker {
    pub fn new(config: &SafetyConfig) -> VerifyResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VerifyError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            max_tax_pct: config.max_tax_pct,
            fallback: ContractCodeChecker::new(config)?,
        })
    }

    async fn fetch_report(&self, token_address: &str) -> VerifyResult<HoneypotReport> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("address", token_address)])
            .send()
            .await
            .map_err(|e| VerifyError::Safety(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Safety(format!("HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| VerifyError::Safety(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl SafetyChecker for HoneypotChecker {
    async fn check(&self, token_address: Option<&str>, chain: &str) -> SafetyStatus {
        let Some(token) = token_address.filter(|t| t.len() >= 10) else {
            return SafetyStatus::Unknown;
        };

        match self.fetch_report(token).await {
            Ok(report) => {
                let status = classify_report(&report, self.max_tax_pct);
                info!(
                    token,
                    %status,
                    buy_tax = ?report.buy_tax,
                    sell_tax = ?report.sell_tax,
                    "Honeypot check"
                );
                status
            }
            Err(e) => {
                warn!(token, error = %e, "Honeypot API unavailable, checking bytecode");
                self.fallback.check(token, chain).await
            }
        }
    }
}
