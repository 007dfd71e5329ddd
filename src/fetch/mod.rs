//! HTTP plumbing shared by both vendor APIs.
//!
//! Vendors build a URL, wrap a [`BasicClient`] in whatever auth layer they
//! need, and decode the JSON body with [`fetch_json`].

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Issues a GET for `url` and returns the raw body.
///
/// Non-2xx statuses are errors; nothing is retried.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid request url '{url}'"))?,
    );

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("request returned status {status}: {body}");
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), "Response body received");
    Ok(bytes.to_vec())
}

/// Issues a GET for `url` and decodes the body as `T`.
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(client: &C, url: &str) -> Result<T> {
    let bytes = fetch_bytes(client, url).await?;
    serde_json::from_slice(&bytes).context("malformed JSON payload")
}
