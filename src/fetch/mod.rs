//! HTTP plumbing: a minimal client trait plus composable auth and retry
//! wrappers.

mod basic;
mod client;
mod retry;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use retry::{Backoff, Retry};

use anyhow::{Result, bail};
use bytes::Bytes;

/// GETs `url` and returns the body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    fetch_request(client, req).await
}

/// Sends `req` and returns the body, treating any non-2xx status as an error.
pub async fn fetch_request<C: HttpClient>(client: &C, req: reqwest::Request) -> Result<Bytes> {
    let url = req.url().clone();
    let resp = client.execute(req).await?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("GET {} returned status {}: {}", url, status, body);
    }

    Ok(resp.bytes().await?)
}
