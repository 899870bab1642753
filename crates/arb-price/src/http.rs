//! Shared HTTP plumbing for providers.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{PriceError, PriceResult};

pub(crate) fn build_client(timeout: Duration) -> PriceResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PriceError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// GET `url` with `query` and decode the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> PriceResult<T> {
    let response = client.get(url).query(query).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PriceError::from_status(status, &body));
    }

    response.json().await.map_err(PriceError::from)
}
