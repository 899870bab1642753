//! Minimal JSON-RPC client for EVM nodes.
//!
//! Used for pool reserve reads and for the contract-code safety fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{PriceError, PriceResult};
use crate::http::build_client;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP.
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> PriceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> PriceResult<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PriceError::from_status(status, &body));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(PriceError::Upstream(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }
        debug!(method, "RPC call succeeded");
        body.result
            .ok_or_else(|| PriceError::Parse(format!("{method}: missing result")))
    }

    /// `eth_call` against `to` with calldata `data`, at the latest block.
    pub async fn eth_call(&self, to: &str, data: &str) -> PriceResult<String> {
        let result = self
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        as_hex_string(result, "eth_call")
    }

    /// Deployed bytecode at `address` as a hex string (`"0x"` if none).
    pub async fn get_code(&self, address: &str) -> PriceResult<String> {
        let result = self.call("eth_getCode", json!([address, "latest"])).await?;
        as_hex_string(result, "eth_getCode")
    }
}

fn as_hex_string(value: Value, method: &str) -> PriceResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(PriceError::Parse(format!(
            "{method}: expected hex string, got {other}"
        ))),
    }
}

/// Byte length of a `0x`-prefixed hex string.
pub fn hex_byte_len(hex: &str) -> usize {
    hex.trim_start_matches("0x").len() / 2
}

/// Split `0x`-prefixed ABI output into 32-byte words as `u128`.
///
/// Words whose upper 16 bytes are non-zero do not fit and yield `None`.
pub fn decode_u128_words(hex: &str) -> Option<Vec<u128>> {
    let body = hex.trim_start_matches("0x");
    if body.len() % 64 != 0 {
        return None;
    }
    body.as_bytes()
        .chunks(64)
        .map(|word| {
            let word = std::str::from_utf8(word).ok()?;
            let (high, low) = word.split_at(32);
            if high.chars().any(|c| c != '0') {
                return None;
            }
            u128::from_str_radix(low, 16).ok()
        })
        .collect()
}
